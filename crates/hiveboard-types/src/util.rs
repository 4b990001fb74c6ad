use chrono::{DateTime, SecondsFormat, Utc};

/// Parse a client-supplied RFC-3339 timestamp into UTC. Any offset is
/// accepted; `+00:00` and friends canonicalize to the same instant.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Render a timestamp the way every response does: RFC-3339 with `Z`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Truncate a string to a maximum number of characters.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Whether a string fits within a character limit (avoids allocating when
/// the common case is "fits").
pub fn exceeds(s: &str, max: usize) -> bool {
    s.chars().count() > max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonicalizes_offset() {
        let plus = parse_timestamp("2026-03-01T10:00:00+00:00").unwrap();
        let zulu = parse_timestamp("2026-03-01T10:00:00Z").unwrap();
        assert_eq!(plus, zulu);

        let shifted = parse_timestamp("2026-03-01T12:00:00+02:00").unwrap();
        assert_eq!(shifted, zulu);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2026-03-01").is_none());
    }

    #[test]
    fn test_format_always_z() {
        let ts = parse_timestamp("2026-03-01T10:00:00.250+00:00").unwrap();
        let formatted = format_timestamp(ts);
        assert!(formatted.ends_with('Z'));
        assert!(!formatted.contains("+00:00"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 4), "abcd");
        assert!(!exceeds("abc", 3));
        assert!(exceeds("abcd", 3));
    }
}
