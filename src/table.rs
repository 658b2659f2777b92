//! Table Persistence
//!
//! Writes the unified and scored event tables as CSV with a header row.
//! Each artifact is a full rewrite through a temp-file-then-rename so a
//! concurrent reader never observes a partial write.

use std::io::Write;
use std::path::Path;

use crate::constants::CANONICAL_FIELDS;
use crate::event::CanonicalEvent;

// ============================================================================
// PUBLIC WRITERS
// ============================================================================

/// Persist the unified event table.
pub fn write_unified(path: &Path, events: &[CanonicalEvent]) -> std::io::Result<()> {
    let mut out = String::new();
    out.push_str(&CANONICAL_FIELDS.join(","));
    out.push('\n');
    for event in events {
        push_row(&mut out, &event.fields());
    }
    write_atomic(path, out.as_bytes())?;
    log::info!("Wrote {} rows to {}", events.len(), path.display());
    Ok(())
}

/// Persist the scored table: unified columns plus the anomaly label
/// (-1 = anomaly, 1 = normal).
pub fn write_scored(path: &Path, events: &[CanonicalEvent], labels: &[i8]) -> std::io::Result<()> {
    debug_assert_eq!(events.len(), labels.len());

    let mut out = String::new();
    out.push_str(&CANONICAL_FIELDS.join(","));
    out.push_str(",anomaly\n");
    for (event, label) in events.iter().zip(labels) {
        let fields = event.fields();
        for field in fields {
            push_field(&mut out, field);
            out.push(',');
        }
        out.push_str(&label.to_string());
        out.push('\n');
    }
    write_atomic(path, out.as_bytes())?;
    log::info!("Wrote {} scored rows to {}", events.len(), path.display());
    Ok(())
}

// ============================================================================
// CSV FORMATTING
// ============================================================================

fn push_row(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push('\n');
}

/// Quote a field when it contains a delimiter, quote, or line break.
fn push_field(out: &mut String, field: &str) {
    if field.contains(|c| matches!(c, ',' | '"' | '\n' | '\r')) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

// ============================================================================
// ATOMIC WRITE
// ============================================================================

/// Full rewrite via sibling temp file, then rename over the target.
fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.flush()?;
    }
    std::fs::rename(&tmp, path)
}

// ============================================================================
// TESTS
// ============================================================================
