//! Bounding captured output before it is returned and stored on a log row.
//!
//! Backup tools can print tens of megabytes of progress. The head of the
//! output says what ran and the tail says how it ended, so the middle is what
//! gets dropped.

/// Cut `output` down to at most `max_chars` characters by removing the middle.
///
/// Output that already fits is returned unchanged. Otherwise the result is
/// the first and last `max_chars / 2` characters joined by a marker line:
///
/// ```text
/// <head>
/// [... 12345 chars omitted ...]
/// <tail>
/// ```
///
/// Splitting happens on `char` boundaries, so multi-byte text is never cut.
pub fn truncate_middle(output: &str, max_chars: usize) -> String {
    if output.len() <= max_chars {
        return output.to_owned();
    }

    let total = output.chars().count();
    if total <= max_chars {
        return output.to_owned();
    }

    let half = max_chars / 2;
    let omitted = total - 2 * half;
    let head: String = output.chars().take(half).collect();
    let tail: String = output.chars().skip(total - half).collect();

    format!("{head}\n[... {omitted} chars omitted ...]\n{tail}")
}
