//! Feature Encoding
//!
//! Maps canonical event records into fixed-width numeric feature vectors
//! for the outlier model: stable integer codes for the categorical fields,
//! pass-through coercion for the numeric ones.

pub mod encoder;
pub mod layout;

pub use encoder::{encode, fit_codebooks, Codebook, CodebookSet, FeatureMatrix};
pub use layout::{FEATURE_COUNT, FEATURE_LAYOUT};
