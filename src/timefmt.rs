//! Timestamp Normalizer
//!
//! Converts any timestamp representation (epoch number, free-form date
//! string, absent) into a canonical RFC 3339 UTC instant string. Absent or
//! entirely unparseable values degrade explicitly: absent becomes "" and an
//! unparseable string is returned verbatim so the raw value survives.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Lenient textual formats, tried in order after RFC 3339 / RFC 2822.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Normalize a loosely-typed timestamp value from a reader.
pub fn normalize_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Number(n) => n
            .as_f64()
            .and_then(from_epoch)
            .unwrap_or_else(|| n.to_string()),
        Value::String(s) => normalize_str(s),
        _ => String::new(),
    }
}

/// Normalize a textual timestamp.
pub fn normalize_str(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    // Numeric-looking strings are epoch seconds (fractional allowed);
    // this is what the external packet decoder emits.
    if let Ok(epoch) = trimmed.parse::<f64>() {
        if let Some(canonical) = from_epoch(epoch) {
            return canonical;
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.with_timezone(&Utc).to_rfc3339();
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return dt.with_timezone(&Utc).to_rfc3339();
    }
    // Suricata-style offsets without a colon ("+0000")
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return dt.with_timezone(&Utc).to_rfc3339();
    }

    // Naive layouts are assumed to already be UTC
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Utc.from_utc_datetime(&naive).to_rfc3339();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Utc.from_utc_datetime(&naive).to_rfc3339();
        }
    }

    // Unparseable: preserve the original representation over discarding it
    s.to_string()
}

/// Render fractional epoch seconds as an RFC 3339 UTC instant.
pub fn from_epoch(secs: f64) -> Option<String> {
    if !secs.is_finite() || secs.abs() > 1e12 {
        return None;
    }
    let whole = secs.floor();
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
    Utc.timestamp_opt(whole as i64, nanos)
        .single()
        .map(|dt| dt.to_rfc3339())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_is_empty() {
        assert_eq!(normalize_value(&Value::Null), "");
        assert_eq!(normalize_str(""), "");
        assert_eq!(normalize_str("   "), "");
    }

    #[test]
    fn test_epoch_number() {
        assert_eq!(normalize_value(&json!(0)), "1970-01-01T00:00:00+00:00");
        assert_eq!(
            normalize_value(&json!(1700000000)),
            "2023-11-14T22:13:20+00:00"
        );
    }

    #[test]
    fn test_epoch_string() {
        // tshark emits epoch seconds as text
        assert_eq!(normalize_str("1700000000"), "2023-11-14T22:13:20+00:00");
        let fractional = normalize_str("1700000000.5");
        assert!(fractional.starts_with("2023-11-14T22:13:20.5"));
    }

    #[test]
    fn test_rfc2822_string() {
        let out = normalize_str("Tue, 14 Nov 2023 22:13:20 +0000");
        assert_eq!(out, "2023-11-14T22:13:20+00:00");
    }

    #[test]
    fn test_suricata_offset_without_colon() {
        let out = normalize_str("2023-11-14T22:13:20.000000+0000");
        assert!(out.starts_with("2023-11-14T22:13:20"));
        assert!(out.ends_with("+00:00"));
    }

    #[test]
    fn test_naive_assumed_utc() {
        assert_eq!(
            normalize_str("2023-11-14 22:13:20"),
            "2023-11-14T22:13:20+00:00"
        );
        assert_eq!(normalize_str("2023-11-14"), "2023-11-14T00:00:00+00:00");
    }

    #[test]
    fn test_offset_converted_to_utc() {
        assert_eq!(
            normalize_str("2023-11-14T23:13:20+01:00"),
            "2023-11-14T22:13:20+00:00"
        );
    }

    #[test]
    fn test_idempotent_on_canonical() {
        let canonical = normalize_str("2023-11-14T22:13:20+00:00");
        assert_eq!(normalize_str(&canonical), canonical);

        let fractional = normalize_str("2023-11-14T22:13:20.500+00:00");
        assert_eq!(normalize_str(&fractional), fractional);
    }

    #[test]
    fn test_unparseable_preserved_verbatim() {
        assert_eq!(normalize_str("not a date"), "not a date");
        assert_eq!(normalize_str("next tuesday"), "next tuesday");
    }
}
