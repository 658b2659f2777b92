//! Email Metadata Reader
//!
//! One record per .eml file: sent date, sender, subject, and any embedded
//! links. Two parsing tiers sit behind one capability trait, selected once
//! at startup: the rich tier walks the full MIME structure and extracts
//! URLs from text bodies; the minimal tier reads headers only. Network
//! fields are always empty and the protocol is fixed to "email".

use std::path::Path;

use mailparse::MailHeaderMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::config::EmailParserKind;
use crate::event::RawRecord;

use super::{ReaderOutput, SourceReader};

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s"'<>]+"#).expect("url regex")
});

// ============================================================================
// EXTRACTED METADATA
// ============================================================================

/// What a parsing tier pulled out of one message.
#[derive(Debug, Default)]
pub struct EmailMetadata {
    /// Epoch seconds when the tier resolved the date itself, else the raw
    /// header text for the timestamp normalizer to deal with
    pub date: Option<Value>,
    pub from: String,
    pub subject: String,
    pub urls: Vec<String>,
}

// ============================================================================
// CAPABILITY INTERFACE
// ============================================================================

/// A parsing tier. Returns None when the file cannot be parsed at all.
pub trait EmailParser {
    fn tier(&self) -> &'static str;
    fn parse(&self, data: &[u8]) -> Option<EmailMetadata>;
}

/// Full MIME parse with body link extraction.
pub struct RichEmailParser;

impl EmailParser for RichEmailParser {
    fn tier(&self) -> &'static str {
        "rich"
    }

    fn parse(&self, data: &[u8]) -> Option<EmailMetadata> {
        let parsed = match mailparse::parse_mail(data) {
            Ok(p) => p,
            Err(e) => {
                log::debug!("MIME parse failed: {}", e);
                return None;
            }
        };

        let mut meta = EmailMetadata::default();

        if let Some(date) = parsed.headers.get_first_value("Date") {
            meta.date = match mailparse::dateparse(&date) {
                Ok(epoch) => Some(Value::Number(epoch.into())),
                Err(_) => Some(Value::String(date)),
            };
        }
        if let Some(from) = parsed.headers.get_first_value("From") {
            meta.from = sender_address(&from);
        }
        meta.subject = parsed.headers.get_first_value("Subject").unwrap_or_default();

        let mut body = String::new();
        collect_text_bodies(&parsed, &mut body);
        meta.urls = URL_RE
            .find_iter(&body)
            .map(|m| m.as_str().to_string())
            .collect();

        Some(meta)
    }
}

/// Header-only extraction: date/from/subject, no link extraction.
pub struct HeaderOnlyParser;

impl EmailParser for HeaderOnlyParser {
    fn tier(&self) -> &'static str {
        "minimal"
    }

    fn parse(&self, data: &[u8]) -> Option<EmailMetadata> {
        let text = String::from_utf8_lossy(data);
        let mut meta = EmailMetadata::default();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.is_empty() {
                break; // end of headers
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                // folded continuation line
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((name, value)) = current.take() {
                store_header(&mut meta, &name, value);
            }
            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
        }
        if let Some((name, value)) = current.take() {
            store_header(&mut meta, &name, value);
        }

        Some(meta)
    }
}

fn store_header(meta: &mut EmailMetadata, name: &str, value: String) {
    match name {
        "date" => meta.date = Some(Value::String(value)),
        "from" => meta.from = sender_address(&value),
        "subject" => meta.subject = value,
        _ => {}
    }
}

/// Pull the bare address out of "Display Name <user@host>" forms.
fn sender_address(from: &str) -> String {
    if let Ok(addrs) = mailparse::addrparse(from) {
        for addr in addrs.iter() {
            if let mailparse::MailAddr::Single(single) = addr {
                return single.addr.clone();
            }
        }
    }
    from.trim().to_string()
}

fn collect_text_bodies(part: &mailparse::ParsedMail, out: &mut String) {
    if part.subparts.is_empty() {
        if part.ctype.mimetype.starts_with("text/") {
            if let Ok(body) = part.get_body() {
                out.push_str(&body);
                out.push('\n');
            }
        }
    } else {
        for sub in &part.subparts {
            collect_text_bodies(sub, out);
        }
    }
}

// ============================================================================
// READER
// ============================================================================

pub struct EmailReader {
    parser: Box<dyn EmailParser>,
}

impl EmailReader {
    /// Tier selection happens once here, from explicit configuration.
    pub fn from_config(kind: EmailParserKind) -> Self {
        let parser: Box<dyn EmailParser> = match kind {
            EmailParserKind::Rich => Box::new(RichEmailParser),
            EmailParserKind::Minimal => Box::new(HeaderOnlyParser),
        };
        Self { parser }
    }
}

impl SourceReader for EmailReader {
    fn source_class(&self) -> &'static str {
        "email"
    }

    fn read(&self, path: &Path) -> ReaderOutput {
        let data = match std::fs::read(path) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Cannot read email {}: {}", path.display(), e);
                return ReaderOutput::empty();
            }
        };

        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut output = ReaderOutput::empty();
        match self.parser.parse(&data) {
            Some(meta) => {
                log::debug!("Parsed email {} with {} tier", basename, self.parser.tier());
                output.records.push(email_record(meta, &basename));
            }
            None => {
                log::warn!("Unparseable email skipped: {}", path.display());
                output.skipped += 1;
            }
        }
        output
    }
}

fn email_record(meta: EmailMetadata, basename: &str) -> RawRecord {
    let mut raw = format!("email:{} from:{} subject:{}", basename, meta.from, meta.subject);
    if !meta.urls.is_empty() {
        raw.push_str(" urls:");
        raw.push_str(&meta.urls.join(","));
    }

    let mut record = RawRecord::new();
    record.insert("ts".to_string(), meta.date.unwrap_or(Value::Null));
    record.insert("proto".to_string(), Value::String("email".to_string()));
    record.insert("event_type".to_string(), Value::String("email".to_string()));
    record.insert("event_subtype".to_string(), Value::String(meta.subject));
    record.insert(
        "raw_message".to_string(),
        Value::String(crate::event::truncate_provenance(&raw)),
    );
    record
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CanonicalEvent;

    const SAMPLE: &str = "Date: Tue, 14 Nov 2023 22:13:20 +0000\r\n\
From: Mallory <mallory@example.com>\r\n\
To: victim@example.org\r\n\
Subject: Urgent invoice\r\n\
Content-Type: text/plain\r\n\
\r\n\
Please review http://phish.example.com/pay now.\r\n";

    #[test]
    fn test_rich_tier_extracts_links() {
        let meta = RichEmailParser.parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(meta.from, "mallory@example.com");
        assert_eq!(meta.subject, "Urgent invoice");
        assert_eq!(meta.urls, vec!["http://phish.example.com/pay".to_string()]);
        // Rich tier resolves the date to epoch seconds itself
        assert_eq!(meta.date, Some(Value::Number(1700000000.into())));
    }

    #[test]
    fn test_minimal_tier_headers_only() {
        let meta = HeaderOnlyParser.parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(meta.from, "mallory@example.com");
        assert_eq!(meta.subject, "Urgent invoice");
        assert!(meta.urls.is_empty());
        // Date stays textual for the timestamp normalizer
        assert_eq!(
            meta.date,
            Some(Value::String("Tue, 14 Nov 2023 22:13:20 +0000".to_string()))
        );
    }

    #[test]
    fn test_minimal_tier_folded_header() {
        let folded = "Subject: a very\r\n long subject\r\n\r\nbody";
        let meta = HeaderOnlyParser.parse(folded.as_bytes()).unwrap();
        assert_eq!(meta.subject, "a very long subject");
    }

    #[test]
    fn test_reader_produces_canonical_email_event() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("phish.eml");
        std::fs::write(&path, SAMPLE).unwrap();

        let reader = EmailReader::from_config(EmailParserKind::Rich);
        let output = reader.read(&path);
        assert_eq!(output.records.len(), 1);

        let event = CanonicalEvent::from_raw(&output.records[0]);
        assert_eq!(event.proto, "email");
        assert_eq!(event.event_type, "email");
        assert_eq!(event.event_subtype, "Urgent invoice");
        assert_eq!(event.src_ip, "");
        assert_eq!(event.src_port, "");
        assert_eq!(event.ts, "2023-11-14T22:13:20+00:00");
        assert!(event.raw_message.starts_with("email:phish.eml"));
        assert!(event.raw_message.contains("urls:http://phish.example.com/pay"));
    }

    #[test]
    fn test_both_tiers_agree_on_headers() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("m.eml");
        std::fs::write(&path, SAMPLE).unwrap();

        let rich = EmailReader::from_config(EmailParserKind::Rich).read(&path);
        let minimal = EmailReader::from_config(EmailParserKind::Minimal).read(&path);

        let rich_event = CanonicalEvent::from_raw(&rich.records[0]);
        let minimal_event = CanonicalEvent::from_raw(&minimal.records[0]);
        assert_eq!(rich_event.ts, minimal_event.ts);
        assert_eq!(rich_event.event_subtype, minimal_event.event_subtype);
    }

    #[test]
    fn test_missing_file_yields_zero_rows() {
        let reader = EmailReader::from_config(EmailParserKind::Minimal);
        let output = reader.read(Path::new("/no/such/mail.eml"));
        assert!(output.records.is_empty());
    }

    #[test]
    fn test_missing_subject_is_empty_marker() {
        let no_subject = "From: a@b.c\r\n\r\nbody";
        let meta = HeaderOnlyParser.parse(no_subject.as_bytes()).unwrap();
        assert_eq!(meta.subject, "");
    }
}
