//! Pipeline Configuration
//!
//! Loaded once at startup from an optional JSON file, with environment
//! variable fallbacks for the paths. Everything downstream receives this
//! struct explicitly; there is no ambient global configuration state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{PipelineError, PipelineResult};

// ============================================================================
// EMAIL PARSER SELECTION
// ============================================================================

/// Which email parsing tier to use.
///
/// Selected once at startup; the minimal tier extracts headers only
/// (date/from/subject) without link extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailParserKind {
    Rich,
    Minimal,
}

// ============================================================================
// PIPELINE CONFIG
// ============================================================================

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory scanned for *.pcap / *.pcapng / *.json / *.eml inputs
    pub raw_dir: PathBuf,
    /// Directory receiving the unified and scored tables
    pub processed_dir: PathBuf,
    /// Expected fraction of anomalous rows per batch
    pub contamination: f64,
    /// Random seed for the isolation forest
    pub seed: u64,
    /// Number of isolation trees
    pub trees: usize,
    /// Per-tree subsample cap
    pub max_samples: usize,
    /// Timeout for the external packet decoder (seconds)
    pub tshark_timeout_secs: u64,
    /// Email parsing tier
    pub email_parser: EmailParserKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from(constants::get_raw_dir()),
            processed_dir: PathBuf::from(constants::get_processed_dir()),
            contamination: constants::DEFAULT_CONTAMINATION,
            seed: constants::DEFAULT_SEED,
            trees: constants::DEFAULT_TREES,
            max_samples: constants::DEFAULT_MAX_SAMPLES,
            tshark_timeout_secs: constants::get_tshark_timeout(),
            email_parser: EmailParserKind::Rich,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        let config = match path {
            Some(p) => {
                let contents = std::fs::read_to_string(p)?;
                serde_json::from_str(&contents)
                    .map_err(|e| PipelineError::Config(format!("{}: {}", p.display(), e)))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject parameter values the scorer cannot work with.
    pub fn validate(&self) -> PipelineResult<()> {
        if !(0.0..=0.5).contains(&self.contamination) {
            return Err(PipelineError::Config(format!(
                "contamination must be in [0.0, 0.5], got {}",
                self.contamination
            )));
        }
        if self.trees == 0 {
            return Err(PipelineError::Config("trees must be >= 1".to_string()));
        }
        if self.max_samples < 2 {
            return Err(PipelineError::Config("max_samples must be >= 2".to_string()));
        }
        Ok(())
    }

    pub fn unified_table_path(&self) -> PathBuf {
        self.processed_dir.join(constants::UNIFIED_TABLE_FILE)
    }

    pub fn scored_table_path(&self) -> PathBuf {
        self.processed_dir.join(constants::SCORED_TABLE_FILE)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.contamination, constants::DEFAULT_CONTAMINATION);
        assert_eq!(config.seed, constants::DEFAULT_SEED);
        assert_eq!(config.email_parser, EmailParserKind::Rich);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"contamination": 0.1, "seed": 7, "email_parser": "minimal"}}"#
        )
        .unwrap();

        let config = PipelineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.contamination, 0.1);
        assert_eq!(config.seed, 7);
        assert_eq!(config.email_parser, EmailParserKind::Minimal);
        // Unspecified fields keep defaults
        assert_eq!(config.trees, constants::DEFAULT_TREES);
    }

    #[test]
    fn test_invalid_contamination_rejected() {
        let config = PipelineConfig {
            contamination: 0.9,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_artifact_paths() {
        let config = PipelineConfig {
            processed_dir: PathBuf::from("/tmp/out"),
            ..Default::default()
        };
        assert_eq!(
            config.unified_table_path(),
            PathBuf::from("/tmp/out/events.csv")
        );
        assert_eq!(
            config.scored_table_path(),
            PathBuf::from("/tmp/out/events_with_anomalies.csv")
        );
    }
}
