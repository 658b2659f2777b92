//! Canonical Event Schema
//!
//! The unified record shape every source is normalized into. Every field is
//! always present; "no value available" is the explicit empty string, never
//! a missing key, so downstream consumers need no existence checks.
//! Records are immutable once emitted; scoring only appends a label column.

use serde::Serialize;
use serde_json::Value;

use crate::constants::RAW_MESSAGE_CAP;
use crate::timefmt;

/// Loosely-typed field mapping emitted by the source readers.
pub type RawRecord = serde_json::Map<String, Value>;

// ============================================================================
// CANONICAL EVENT
// ============================================================================

/// One normalized record per observed occurrence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CanonicalEvent {
    /// Canonical UTC instant, or "" when absent / raw text when unparseable
    pub ts: String,
    /// Network endpoints; empty for non-network sources
    pub src_ip: String,
    pub dst_ip: String,
    /// Transport ports; empty when inapplicable
    pub src_port: String,
    pub dst_port: String,
    /// Protocol name/label; "" if unknown
    pub proto: String,
    /// Coarse classification (pcap_packet, ids_alert, email, ...)
    pub event_type: String,
    /// Fine-grained classification (signature name, subject, ...)
    pub event_subtype: String,
    /// Byte length or analogous size metric
    pub payload_size: String,
    /// Provenance: source identity plus truncated raw content
    pub raw_message: String,
}

impl CanonicalEvent {
    /// Project a loose reader record onto the canonical schema.
    ///
    /// Missing keys become the empty marker; the ts field goes through the
    /// timestamp normalizer here, in one place, for every source.
    pub fn from_raw(raw: &RawRecord) -> Self {
        Self {
            ts: raw.get("ts").map(timefmt::normalize_value).unwrap_or_default(),
            src_ip: loose_string(raw.get("src_ip")),
            dst_ip: loose_string(raw.get("dst_ip")),
            src_port: loose_string(raw.get("src_port")),
            dst_port: loose_string(raw.get("dst_port")),
            proto: loose_string(raw.get("proto")),
            event_type: loose_string(raw.get("event_type")),
            event_subtype: loose_string(raw.get("event_subtype")),
            payload_size: loose_string(raw.get("payload_size")),
            raw_message: loose_string(raw.get("raw_message")),
        }
    }

    /// Field values in canonical column order.
    pub fn fields(&self) -> [&str; 10] {
        [
            &self.ts,
            &self.src_ip,
            &self.dst_ip,
            &self.src_port,
            &self.dst_port,
            &self.proto,
            &self.event_type,
            &self.event_subtype,
            &self.payload_size,
            &self.raw_message,
        ]
    }
}

// ============================================================================
// LOOSE VALUE HELPERS
// ============================================================================

/// Stringify a loose JSON value; absence and null are the empty marker.
fn loose_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Duck-typed key lookup: explicit priority-ordered alias list, first
/// usable value wins. Null and empty-string values count as absent and
/// the scan moves on to the next alias.
pub fn first_present<'a>(record: &'a RawRecord, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| {
        record
            .get(*k)
            .filter(|v| !v.is_null() && v.as_str().map_or(true, |s| !s.is_empty()))
    })
}

/// Cap a provenance string at the configured byte budget, on a char boundary.
pub fn truncate_provenance(s: &str) -> String {
    if s.len() <= RAW_MESSAGE_CAP {
        return s.to_string();
    }
    let mut end = RAW_MESSAGE_CAP;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_record_projects_to_all_empty_fields() {
        let event = CanonicalEvent::from_raw(&RawRecord::new());
        for field in event.fields() {
            assert_eq!(field, "");
        }
    }

    #[test]
    fn test_projection_stringifies_loose_types() {
        let mut raw = RawRecord::new();
        raw.insert("src_ip".to_string(), json!("10.0.0.1"));
        raw.insert("src_port".to_string(), json!(443));
        raw.insert("payload_size".to_string(), json!(1500));
        raw.insert("proto".to_string(), Value::Null);

        let event = CanonicalEvent::from_raw(&raw);
        assert_eq!(event.src_ip, "10.0.0.1");
        assert_eq!(event.src_port, "443");
        assert_eq!(event.payload_size, "1500");
        assert_eq!(event.proto, "");
        // Keys never looked up are still present as empty fields
        assert_eq!(event.dst_ip, "");
    }

    #[test]
    fn test_ts_normalized_during_projection() {
        let mut raw = RawRecord::new();
        raw.insert("ts".to_string(), json!(1700000000));
        let event = CanonicalEvent::from_raw(&raw);
        assert_eq!(event.ts, "2023-11-14T22:13:20+00:00");
    }

    #[test]
    fn test_first_present_priority_order() {
        let mut record = RawRecord::new();
        record.insert("source_ip".to_string(), json!("2.2.2.2"));
        record.insert("src".to_string(), json!("3.3.3.3"));

        let found = first_present(&record, &["src_ip", "source_ip", "src"]);
        assert_eq!(found, Some(&json!("2.2.2.2")));

        assert!(first_present(&record, &["nope", "missing"]).is_none());
    }

    #[test]
    fn test_first_present_null_falls_through_to_next_alias() {
        let mut record = RawRecord::new();
        record.insert("src_ip".to_string(), Value::Null);
        record.insert("source_ip".to_string(), json!("1.2.3.4"));

        let found = first_present(&record, &["src_ip", "source_ip"]);
        assert_eq!(found, Some(&json!("1.2.3.4")));

        assert!(first_present(&record, &["src_ip"]).is_none());
    }

    #[test]
    fn test_first_present_empty_string_falls_through() {
        let mut record = RawRecord::new();
        record.insert("proto".to_string(), json!(""));
        record.insert("protocol".to_string(), json!("UDP"));

        let found = first_present(&record, &["proto", "protocol"]);
        assert_eq!(found, Some(&json!("UDP")));
    }

    #[test]
    fn test_truncate_provenance() {
        let short = "abc";
        assert_eq!(truncate_provenance(short), "abc");

        let long = "x".repeat(RAW_MESSAGE_CAP + 50);
        assert_eq!(truncate_provenance(&long).len(), RAW_MESSAGE_CAP);

        // Multi-byte content never splits a char
        let wide = "é".repeat(RAW_MESSAGE_CAP);
        let truncated = truncate_provenance(&wide);
        assert!(truncated.len() <= RAW_MESSAGE_CAP);
        assert!(truncated.chars().all(|c| c == 'é'));
    }
}
