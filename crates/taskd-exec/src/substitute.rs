//! Placeholder expansion for backup commands.

use chrono::{DateTime, SecondsFormat, Utc};

/// Replaced with a filesystem-safe UTC timestamp, e.g. `2026-10-16T12-34-56-789Z`.
pub const TIMESTAMP_PLACEHOLDER: &str = "${timestamp}";
/// Replaced with the UTC calendar date, e.g. `2026-10-16`.
pub const DATE_PLACEHOLDER: &str = "${date}";

/// Expand `${timestamp}` and `${date}` in `command` using `now`.
///
/// The timestamp is ISO-8601 with millisecond precision, with every `:` and
/// `.` turned into `-` so it can be used inside file names.
pub fn substitute_placeholders(command: &str, now: DateTime<Utc>) -> String {
    let timestamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    let date = now.format("%Y-%m-%d").to_string();

    command
        .replace(TIMESTAMP_PLACEHOLDER, &timestamp)
        .replace(DATE_PLACEHOLDER, &date)
}
