//! telsift - Security Telemetry Normalization & Anomaly Scoring

mod config;
mod constants;
mod error;
mod event;
mod features;
mod pipeline;
mod readers;
mod scoring;
mod table;
mod timefmt;

use std::path::Path;

use config::PipelineConfig;
use constants::{APP_NAME, APP_VERSION};
use error::PipelineError;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting {} v{}...", APP_NAME, APP_VERSION);

    // Optional positional arg: path to a JSON config file
    let config_path = std::env::args().nth(1);
    let config = match PipelineConfig::load(config_path.as_deref().map(Path::new)) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(2);
        }
    };

    log::info!("Raw input: {}", config.raw_dir.display());
    log::info!("Output: {}", config.processed_dir.display());

    match pipeline::run(&config) {
        Ok(report) => {
            for source in &report.per_source {
                log::info!(
                    "  {}: {} rows, {} skipped ({})",
                    source.class,
                    source.rows,
                    source.skipped,
                    source.path.display()
                );
            }
            log::info!("{}", report.summary());
        }
        Err(PipelineError::NoData) => {
            log::warn!(
                "No events found in {} - nothing written",
                config.raw_dir.display()
            );
        }
        Err(e) => {
            log::error!("Pipeline failed: {}", e);
            std::process::exit(1);
        }
    }
}
