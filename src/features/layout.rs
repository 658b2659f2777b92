//! Feature Layout
//!
//! Centralized column ordering for the feature matrix. The order is fixed
//! for a run; every consumer indexes through this module instead of
//! hardcoding positions.

/// Number of features per event
pub const FEATURE_COUNT: usize = 7;

/// Feature columns, in matrix order
pub const FEATURE_LAYOUT: [&str; FEATURE_COUNT] = [
    "src_ip_code",
    "dst_ip_code",
    "src_port",
    "dst_port",
    "proto_code",
    "event_type_code",
    "payload_size",
];
