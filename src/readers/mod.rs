//! Source Readers
//!
//! Three independent adapters turn raw source files into sequences of
//! loosely-typed field mappings. Contract for all of them: never raise past
//! the adapter boundary. A source that cannot be used at all contributes
//! zero rows; a malformed record inside a usable source is skipped and
//! counted.

pub mod alerts;
pub mod email;
pub mod pcap;

use std::path::{Path, PathBuf};

use crate::constants::EMAIL_SUBDIR;
use crate::event::RawRecord;

pub use alerts::AlertReader;
pub use email::EmailReader;
pub use pcap::PcapReader;

// ============================================================================
// READER CONTRACT
// ============================================================================

/// What one reader produced for one source file.
#[derive(Debug, Default)]
pub struct ReaderOutput {
    pub records: Vec<RawRecord>,
    /// Records inside the source that could not be parsed
    pub skipped: usize,
}

impl ReaderOutput {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A source adapter. Implementations absorb all failures locally.
pub trait SourceReader {
    /// Short label for per-source reporting ("pcap", "alert", "email")
    fn source_class(&self) -> &'static str;

    /// Decode one source file into loose records. Must not panic or error;
    /// fatal inability to access the source yields an empty output.
    fn read(&self, path: &Path) -> ReaderOutput;
}

// ============================================================================
// SOURCE DISCOVERY
// ============================================================================

/// Input files discovered under the raw directory, grouped by source class.
/// Each group is path-sorted so the ingestion order is deterministic.
#[derive(Debug, Default)]
pub struct SourceSet {
    pub pcaps: Vec<PathBuf>,
    pub alerts: Vec<PathBuf>,
    pub emails: Vec<PathBuf>,
    pub email_folder: Vec<PathBuf>,
}

impl SourceSet {
    pub fn is_empty(&self) -> bool {
        self.pcaps.is_empty()
            && self.alerts.is_empty()
            && self.emails.is_empty()
            && self.email_folder.is_empty()
    }
}

/// Scan the raw input directory. A missing or unreadable directory is a
/// source-unavailable condition: logged, and the run continues with nothing.
pub fn discover_sources(raw_dir: &Path) -> SourceSet {
    let mut set = SourceSet::default();

    for path in list_files(raw_dir) {
        match extension(&path).as_deref() {
            Some("pcap") | Some("pcapng") => set.pcaps.push(path),
            Some("json") => set.alerts.push(path),
            Some("eml") => set.emails.push(path),
            _ => {}
        }
    }

    let email_dir = raw_dir.join(EMAIL_SUBDIR);
    if email_dir.is_dir() {
        for path in list_files(&email_dir) {
            if extension(&path).as_deref() == Some("eml") {
                set.email_folder.push(path);
            }
        }
    }

    set.pcaps.sort();
    set.alerts.sort();
    set.emails.sort();
    set.email_folder.sort();
    set
}

fn list_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(e) => {
            log::warn!("Cannot read input directory {}: {}", dir.display(), e);
            Vec::new()
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discovery_groups_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in ["b.pcap", "a.pcap", "eve.json", "phish.eml", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let sub = dir.path().join(EMAIL_SUBDIR);
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("bulk.eml"), b"x").unwrap();

        let set = discover_sources(dir.path());
        assert_eq!(set.pcaps.len(), 2);
        assert!(set.pcaps[0].ends_with("a.pcap"));
        assert_eq!(set.alerts.len(), 1);
        assert_eq!(set.emails.len(), 1);
        assert_eq!(set.email_folder.len(), 1);
        assert!(!set.is_empty());
    }

    #[test]
    fn test_missing_dir_is_empty_not_fatal() {
        let set = discover_sources(Path::new("/definitely/not/here"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_pcapng_counts_as_capture() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cap.pcapng"), b"x").unwrap();
        let set = discover_sources(dir.path());
        assert_eq!(set.pcaps.len(), 1);
    }
}
