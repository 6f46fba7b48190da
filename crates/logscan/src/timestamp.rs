//! Timestamp prefix handling for `kubectl logs --timestamps` style lines.

use chrono::{DateTime, FixedOffset};

/// Split a leading RFC 3339 timestamp token off a log line.
///
/// The timestamp and exactly one separating space are removed so the
/// original indentation of the remaining line is kept.
#[must_use]
pub fn split_timestamp(line: &str) -> (Option<DateTime<FixedOffset>>, &str) {
    let Some((token, rest)) = line.split_once(' ') else {
        return match DateTime::parse_from_rfc3339(line) {
            Ok(ts) => (Some(ts), ""),
            Err(_) => (None, line),
        };
    };
    match DateTime::parse_from_rfc3339(token) {
        Ok(ts) => (Some(ts), rest),
        Err(_) => (None, line),
    }
}

/// The line without its timestamp prefix, if it has one.
#[must_use]
pub fn strip_timestamp(line: &str) -> &str {
    split_timestamp(line).1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_rfc3339_prefix() {
        assert_eq!(
            strip_timestamp("2024-05-01T12:00:00.123456789Z connection refused"),
            "connection refused"
        );
        assert_eq!(
            strip_timestamp("2024-05-01T12:00:00+02:00     at com.foo.Bar.baz(Bar.java:42)"),
            "    at com.foo.Bar.baz(Bar.java:42)"
        );
    }

    #[test]
    fn test_lines_without_timestamp_untouched() {
        assert_eq!(strip_timestamp("connection refused"), "connection refused");
        assert_eq!(strip_timestamp("  at foo"), "  at foo");
        assert_eq!(strip_timestamp(""), "");
        assert!(split_timestamp("12:00:00 hello").0.is_none());
    }

    #[test]
    fn test_bare_timestamp() {
        let (ts, rest) = split_timestamp("2024-05-01T12:00:00Z");
        assert!(ts.is_some());
        assert_eq!(rest, "");
    }
}
