//! Categorical Codebooks and Matrix Assembly
//!
//! Each categorical field gets an explicit value-to-index bijection built
//! once per run from the run's own observed value set, in alphabetical
//! order. The mapping is consistent within a run (and across reruns of
//! identical input) but is NOT stable across runs whose value sets differ;
//! that is an accepted limitation of the per-run encoding.

use std::collections::{BTreeMap, BTreeSet};

use crate::event::CanonicalEvent;

use super::layout::FEATURE_COUNT;

// ============================================================================
// CODEBOOK
// ============================================================================

/// Value-to-code bijection for one categorical field.
#[derive(Debug, Clone, Default)]
pub struct Codebook {
    codes: BTreeMap<String, usize>,
}

impl Codebook {
    /// Build from observed values, alphabetically coded from zero.
    pub fn fit<'a, I: IntoIterator<Item = &'a str>>(values: I) -> Self {
        let distinct: BTreeSet<&str> = values.into_iter().collect();
        let codes = distinct
            .into_iter()
            .enumerate()
            .map(|(code, value)| (value.to_string(), code))
            .collect();
        Self { codes }
    }

    pub fn code(&self, value: &str) -> Option<usize> {
        self.codes.get(value).copied()
    }

    pub fn n_codes(&self) -> usize {
        self.codes.len()
    }
}

/// One codebook per categorical canonical field.
#[derive(Debug, Clone, Default)]
pub struct CodebookSet {
    pub src_ip: Codebook,
    pub dst_ip: Codebook,
    pub proto: Codebook,
    pub event_type: Codebook,
}

/// Fit all categorical codebooks from the run's unified table.
pub fn fit_codebooks(events: &[CanonicalEvent]) -> CodebookSet {
    CodebookSet {
        src_ip: Codebook::fit(events.iter().map(|e| e.src_ip.as_str())),
        dst_ip: Codebook::fit(events.iter().map(|e| e.dst_ip.as_str())),
        proto: Codebook::fit(events.iter().map(|e| e.proto.as_str())),
        event_type: Codebook::fit(events.iter().map(|e| e.event_type.as_str())),
    }
}

// ============================================================================
// FEATURE MATRIX
// ============================================================================

/// Row-major feature matrix, one fixed-order row per event.
#[derive(Debug, Clone, Default)]
pub struct FeatureMatrix {
    pub rows: Vec<[f64; FEATURE_COUNT]>,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// True when no column varies; such a matrix cannot be split on.
    pub fn is_constant(&self) -> bool {
        match self.rows.first() {
            None => true,
            Some(first) => self.rows.iter().all(|row| row == first),
        }
    }
}

/// Assemble the matrix: codes for categoricals, coerced numbers for the
/// rest. Coercion never fails; the empty marker becomes the 0.0 sentinel.
pub fn encode(events: &[CanonicalEvent], codebooks: &CodebookSet) -> FeatureMatrix {
    let rows = events
        .iter()
        .map(|e| {
            [
                codebooks.src_ip.code(&e.src_ip).unwrap_or(0) as f64,
                codebooks.dst_ip.code(&e.dst_ip).unwrap_or(0) as f64,
                coerce_numeric(&e.src_port),
                coerce_numeric(&e.dst_port),
                codebooks.proto.code(&e.proto).unwrap_or(0) as f64,
                codebooks.event_type.code(&e.event_type).unwrap_or(0) as f64,
                coerce_numeric(&e.payload_size),
            ]
        })
        .collect();
    FeatureMatrix { rows }
}

/// Empty or unparseable numeric fields map to the fixed sentinel.
fn coerce_numeric(value: &str) -> f64 {
    value.trim().parse::<f64>().unwrap_or(0.0)
}

// ============================================================================
// TESTS
// ============================================================================
