//! Alert Log Reader
//!
//! Parses line-delimited IDS alert logs (one JSON object per line, Suricata
//! eve.json shaped). Heterogeneous producers name the same concept under
//! different keys, so every canonical field carries an explicit
//! priority-ordered alias list resolved first-present-wins. A line that is
//! not valid JSON is skipped and counted, never fatal.

use std::io::{BufRead, BufReader};
use std::path::Path;

use serde_json::Value;

use crate::event::{first_present, truncate_provenance, RawRecord};

use super::{ReaderOutput, SourceReader};

// ============================================================================
// FIELD ALIASES
// ============================================================================

const TS_KEYS: &[&str] = &["timestamp", "@timestamp", "ts"];
const SRC_IP_KEYS: &[&str] = &["src_ip", "source_ip", "src"];
const DST_IP_KEYS: &[&str] = &["dest_ip", "destination_ip", "dst"];
const SRC_PORT_KEYS: &[&str] = &["src_port", "sport"];
const DST_PORT_KEYS: &[&str] = &["dest_port", "dport"];
const PROTO_KEYS: &[&str] = &["proto", "protocol"];
const SIZE_KEYS: &[&str] = &["payload_len", "length"];

/// event_type when the record carries none of its own
const DEFAULT_EVENT_TYPE: &str = "ids_alert";

// ============================================================================
// READER
// ============================================================================

pub struct AlertReader;

impl SourceReader for AlertReader {
    fn source_class(&self) -> &'static str {
        "alert"
    }

    fn read(&self, path: &Path) -> ReaderOutput {
        let file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("Cannot open alert log {}: {}", path.display(), e);
                return ReaderOutput::empty();
            }
        };

        let mut output = ReaderOutput::empty();
        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    log::warn!("Read error in {}: {}", path.display(), e);
                    output.skipped += 1;
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&line) {
                Ok(Value::Object(obj)) => output.records.push(project_alert(&obj)),
                Ok(_) => {
                    log::debug!("Non-object alert line skipped in {}", path.display());
                    output.skipped += 1;
                }
                Err(e) => {
                    log::debug!("Unparseable alert line in {}: {}", path.display(), e);
                    output.skipped += 1;
                }
            }
        }

        log::info!(
            "Parsed {} alerts from {} ({} skipped)",
            output.records.len(),
            path.display(),
            output.skipped
        );
        output
    }
}

// ============================================================================
// PROJECTION
// ============================================================================

/// Map one structured alert onto the loose canonical key set.
fn project_alert(obj: &RawRecord) -> RawRecord {
    let mut record = RawRecord::new();

    copy_alias(&mut record, "ts", obj, TS_KEYS);
    copy_alias(&mut record, "src_ip", obj, SRC_IP_KEYS);
    copy_alias(&mut record, "dst_ip", obj, DST_IP_KEYS);
    copy_alias(&mut record, "src_port", obj, SRC_PORT_KEYS);
    copy_alias(&mut record, "dst_port", obj, DST_PORT_KEYS);
    copy_alias(&mut record, "proto", obj, PROTO_KEYS);
    copy_alias(&mut record, "payload_size", obj, SIZE_KEYS);

    let event_type = obj
        .get("event_type")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_EVENT_TYPE);
    record.insert("event_type".to_string(), Value::String(event_type.to_string()));

    // Signature/rule name, if present, is the fine-grained classification
    if let Some(signature) = obj
        .get("alert")
        .and_then(|a| a.get("signature"))
        .and_then(Value::as_str)
    {
        record.insert(
            "event_subtype".to_string(),
            Value::String(signature.to_string()),
        );
    }

    let raw = serde_json::to_string(obj).unwrap_or_default();
    record.insert(
        "raw_message".to_string(),
        Value::String(truncate_provenance(&raw)),
    );

    record
}

fn copy_alias(record: &mut RawRecord, canonical: &str, obj: &RawRecord, keys: &[&str]) {
    if let Some(value) = first_present(obj, keys) {
        record.insert(canonical.to_string(), value.clone());
    }
}

// ============================================================================
// TESTS
// ============================================================================
