//! Central Configuration Constants
//!
//! Single source of truth for all pipeline defaults.
//! To change a default path or model parameter, only edit this file.

/// Canonical event columns, in the exact order they appear in the
/// persisted tables.
pub const CANONICAL_FIELDS: [&str; 10] = [
    "ts",
    "src_ip",
    "dst_ip",
    "src_port",
    "dst_port",
    "proto",
    "event_type",
    "event_subtype",
    "payload_size",
    "raw_message",
];

/// Default directory scanned for raw input files
pub const DEFAULT_RAW_DIR: &str = "data/raw";

/// Default directory for pipeline output artifacts
pub const DEFAULT_PROCESSED_DIR: &str = "data/processed";

/// Unified event table filename
pub const UNIFIED_TABLE_FILE: &str = "events.csv";

/// Scored event table filename
pub const SCORED_TABLE_FILE: &str = "events_with_anomalies.csv";

/// Subfolder of the raw dir holding bulk email files
pub const EMAIL_SUBDIR: &str = "emails";

/// Maximum length of the raw_message provenance field (bytes)
pub const RAW_MESSAGE_CAP: usize = 2000;

/// Default expected fraction of anomalous rows per batch
pub const DEFAULT_CONTAMINATION: f64 = 0.2;

/// Default random seed for the isolation forest
pub const DEFAULT_SEED: u64 = 42;

/// Default number of isolation trees
pub const DEFAULT_TREES: usize = 100;

/// Default per-tree subsample cap
pub const DEFAULT_MAX_SAMPLES: usize = 256;

/// Default timeout for the external packet decoder (seconds)
pub const DEFAULT_TSHARK_TIMEOUT: u64 = 60;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "telsift";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get raw input directory from environment or use default
pub fn get_raw_dir() -> String {
    std::env::var("TELSIFT_RAW_DIR").unwrap_or_else(|_| DEFAULT_RAW_DIR.to_string())
}

/// Get processed output directory from environment or use default
pub fn get_processed_dir() -> String {
    std::env::var("TELSIFT_PROCESSED_DIR").unwrap_or_else(|_| DEFAULT_PROCESSED_DIR.to_string())
}

/// Get external decoder timeout from environment or use default
pub fn get_tshark_timeout() -> u64 {
    std::env::var("TELSIFT_TSHARK_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_TSHARK_TIMEOUT)
}
