//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Formats a number of seconds as `MM:SS`.
///
/// Minutes are not wrapped at 60, so a two hour mix renders as `120:00`.
#[must_use]
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Parses `SS`, `MM:SS` or `HH:MM:SS` into seconds.
///
/// Returns `None` for empty input, non-numeric parts or more than three parts.
#[must_use]
pub fn parse_clock(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    parts.iter().try_fold(0u64, |acc, part| {
        let value: u64 = part.trim().parse().ok()?;
        acc.checked_mul(60)?.checked_add(value)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Text Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Best-effort title casing: the first letter of every alphabetic run is
/// upper-cased and the rest of the run is lower-cased.
///
/// Blank input yields `"Unknown"`.
#[must_use]
pub fn title_case(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "Unknown".to_string();
    }

    let mut out = String::with_capacity(trimmed.len());
    let mut in_word = false;
    for ch in trimmed.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

/// Returns true if the input looks like an `http://` or `https://` URL.
#[must_use]
pub fn is_http_url(text: &str) -> bool {
    let lower = text.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_clock_pads_minutes_and_seconds() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(65), "01:05");
        assert_eq!(format_clock(180), "03:00");
    }

    #[test]
    fn format_clock_does_not_wrap_hours() {
        assert_eq!(format_clock(7200), "120:00");
    }

    #[test]
    fn parse_clock_accepts_common_shapes() {
        assert_eq!(parse_clock("42"), Some(42));
        assert_eq!(parse_clock("3:05"), Some(185));
        assert_eq!(parse_clock("1:00:01"), Some(3601));
    }

    #[test]
    fn parse_clock_rejects_garbage() {
        assert_eq!(parse_clock(""), None);
        assert_eq!(parse_clock("live"), None);
        assert_eq!(parse_clock("1:2:3:4"), None);
    }

    #[test]
    fn title_case_normalizes_words() {
        assert_eq!(title_case("never gonna GIVE you up"), "Never Gonna Give You Up");
        assert_eq!(title_case("  "), "Unknown");
    }

    #[test]
    fn title_case_treats_punctuation_as_boundary() {
        assert_eq!(title_case("rock'n'roll"), "Rock'N'Roll");
        assert_eq!(title_case("ac/dc - thunderstruck"), "Ac/Dc - Thunderstruck");
    }

    #[test]
    fn http_url_detection() {
        assert!(is_http_url("https://example.com/live.m3u8"));
        assert!(is_http_url("HTTP://radio"));
        assert!(!is_http_url("despacito"));
    }
}
