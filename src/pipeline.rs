//! Batch Pipeline
//!
//! Single-threaded, fully sequential run over static files: discover
//! sources, read them in deterministic source-class order (packet captures,
//! then alert logs, then single emails, then the bulk email folder),
//! normalize, persist the unified table, encode, score, persist the scored
//! table. Each stage fully consumes its input before the next starts.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::event::CanonicalEvent;
use crate::features;
use crate::readers::{self, AlertReader, EmailReader, PcapReader, SourceReader};
use crate::scoring;
use crate::table;

// ============================================================================
// RUN REPORT
// ============================================================================

/// Row contribution of one source file.
#[derive(Debug, Clone, Serialize)]
pub struct SourceCount {
    pub class: String,
    pub path: PathBuf,
    pub rows: usize,
    pub skipped: usize,
}

/// What one full run produced.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub per_source: Vec<SourceCount>,
    pub total_rows: usize,
    pub skipped: usize,
    pub anomalies: usize,
    pub unified_path: PathBuf,
    pub scored_path: PathBuf,
}

impl RunReport {
    pub fn summary(&self) -> String {
        format!(
            "{} rows from {} sources ({} records skipped), {} anomalies -> {}",
            self.total_rows,
            self.per_source.len(),
            self.skipped,
            self.anomalies,
            self.scored_path.display()
        )
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Run the whole batch. Artifacts are written only for stages that
/// completed; a scoring failure still leaves the unified table behind.
pub fn run(config: &PipelineConfig) -> PipelineResult<RunReport> {
    let sources = readers::discover_sources(&config.raw_dir);
    if sources.is_empty() {
        log::warn!("No input files under {}", config.raw_dir.display());
    }

    // Ingest in deterministic source-class-then-path order
    let mut events: Vec<CanonicalEvent> = Vec::new();
    let mut per_source = Vec::new();
    let mut skipped = 0usize;

    let pcap_reader = PcapReader::new(config.tshark_timeout_secs);
    let alert_reader = AlertReader;
    let email_reader = EmailReader::from_config(config.email_parser);

    let mut ingest = |reader: &dyn SourceReader, paths: &[PathBuf]| {
        for path in paths {
            let output = reader.read(path);
            per_source.push(SourceCount {
                class: reader.source_class().to_string(),
                path: path.clone(),
                rows: output.records.len(),
                skipped: output.skipped,
            });
            skipped += output.skipped;
            events.extend(output.records.iter().map(CanonicalEvent::from_raw));
        }
    };

    ingest(&pcap_reader, &sources.pcaps);
    ingest(&alert_reader, &sources.alerts);
    ingest(&email_reader, &sources.emails);
    ingest(&email_reader, &sources.email_folder);
    drop(ingest);

    if events.is_empty() {
        // Neutral no-data outcome: nothing overwritten, nothing ambiguous
        return Err(PipelineError::NoData);
    }

    // Persist the unified table before scoring so it survives a fit failure
    let unified_path = config.unified_table_path();
    table::write_unified(&unified_path, &events)?;

    // Encode and score the entire batch at once
    let codebooks = features::fit_codebooks(&events);
    log::debug!(
        "Codebooks: {} src ips, {} dst ips, {} protocols, {} event types",
        codebooks.src_ip.n_codes(),
        codebooks.dst_ip.n_codes(),
        codebooks.proto.n_codes(),
        codebooks.event_type.n_codes()
    );
    let matrix = features::encode(&events, &codebooks);
    log::debug!(
        "Encoded {} rows, columns {:?}",
        matrix.n_rows(),
        features::FEATURE_LAYOUT
    );
    let outcome = scoring::score_batch(&matrix, config)?;
    if let Some(top) = outcome
        .scores
        .iter()
        .cloned()
        .fold(None::<f64>, |acc, s| Some(acc.map_or(s, |a| a.max(s))))
    {
        log::debug!("Top anomaly score: {:.4}", top);
    }

    let scored_path = config.scored_table_path();
    table::write_scored(&scored_path, &events, &outcome.labels)?;

    let report = RunReport {
        total_rows: events.len(),
        skipped,
        anomalies: outcome.anomaly_count(),
        per_source,
        unified_path,
        scored_path,
    };
    log::info!("Found {} anomalies in {} events", report.anomalies, report.total_rows);
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================
