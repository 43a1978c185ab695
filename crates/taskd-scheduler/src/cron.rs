//! Cron expression validation and next-fire computation.
//!
//! Only the classic five-field form is accepted:
//!
//! ```text
//! ┌───────── minute (0-59)
//! │ ┌─────── hour (0-23)
//! │ │ ┌───── day of month (1-31)
//! │ │ │ ┌─── month (1-12)
//! │ │ │ │ ┌─ day of week (0-7, 0 and 7 are Sunday)
//! * * * * *
//! ```
//!
//! Six-field (seconds) expressions and `@daily`-style nicknames are rejected
//! even though the underlying parser understands them.

use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use croner::Cron;

/// Number of whitespace-separated fields in a valid expression.
pub const CRON_FIELDS: usize = 5;

/// A parsed five-field cron expression.
pub struct CronSchedule {
    expression: String,
    cron: Cron,
}

impl CronSchedule {
    /// Parse `expression`, returning a human-readable reason on failure.
    pub fn parse(expression: &str) -> Result<Self, String> {
        let fields = expression.split_whitespace().count();
        if fields != CRON_FIELDS {
            return Err(format!(
                "expected {CRON_FIELDS} fields, found {fields} in {expression:?}"
            ));
        }

        let cron = Cron::new(expression)
            .parse()
            .map_err(|e| format!("{expression:?}: {e}"))?;

        Ok(Self {
            expression: expression.to_string(),
            cron,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`, evaluated on the wall clock of
    /// `tz`. `None` when the expression can never match again.
    pub fn next_after(&self, tz: Tz, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&tz);
        self.cron
            .find_next_occurrence(&local, false)
            .ok()
            .map(|next| next.with_timezone(&Utc))
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}

/// Whether `expression` is a syntactically valid five-field cron expression.
///
/// Never panics; empty and garbage input simply return `false`.
pub fn validate(expression: &str) -> bool {
    CronSchedule::parse(expression).is_ok()
}

/// Next fire time of `expression` after `after` in `tz`, or `None` when the
/// expression is invalid or exhausted.
pub fn next_occurrence(expression: &str, tz: Tz, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    CronSchedule::parse(expression).ok()?.next_after(tz, after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn accepts_common_expressions() {
        for expr in [
            "* * * * *",
            "0 3 * * *",
            "*/15 * * * *",
            "0 9-17 * * 1-5",
            "30 2 1 * *",
            "0 0 * * 0",
            "5,35 */2 * * *",
            "  0   3 * *   *  ",
        ] {
            assert!(validate(expr), "{expr:?} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_expressions() {
        for expr in [
            "",
            "   ",
            "invalid cron",
            "* * * *",
            "0 * * * * *",
            "60 * * * *",
            "0 24 * * *",
            "0 0 32 * *",
            "0 0 * 13 *",
            "a b c d e",
            "@daily",
        ] {
            assert!(!validate(expr), "{expr:?} should be rejected");
        }
    }

    #[test]
    fn parse_reports_field_count() {
        let err = CronSchedule::parse("0 * * * * *").unwrap_err();
        assert!(err.contains("expected 5 fields, found 6"), "{err}");
    }

    #[test]
    fn next_fire_uses_wall_clock_of_timezone() {
        // 03:00 in São Paulo (UTC-3, no DST) is 06:00 UTC.
        let after = Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap();
        let next = next_occurrence("0 3 * * *", chrono_tz::America::Sao_Paulo, after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 16, 6, 0, 0).unwrap());

        let utc_next = next_occurrence("0 3 * * *", chrono_tz::UTC, after).unwrap();
        assert_eq!(utc_next, Utc.with_ymd_and_hms(2026, 10, 16, 3, 0, 0).unwrap());
    }

    #[test]
    fn next_fire_is_strictly_after() {
        let on_the_minute = Utc.with_ymd_and_hms(2026, 10, 16, 12, 30, 0).unwrap();
        let next = next_occurrence("* * * * *", chrono_tz::UTC, on_the_minute).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 16, 12, 31, 0).unwrap());
    }

    #[test]
    fn invalid_expression_has_no_next_fire() {
        assert!(next_occurrence("not a cron", chrono_tz::UTC, Utc::now()).is_none());
    }
}
