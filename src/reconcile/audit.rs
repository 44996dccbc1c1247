//! Append-only CSV log of mismatches and the action taken for each.
//!
//! Rows have no header and vary in length: a run marker, one row per
//! mismatch, and one row per failed write.

use anyhow::{Context, Result};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use super::ExpectedMetadata;
use crate::filemeta::WriteReport;

pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Separator between expected keywords in the keyword column.
const KEYWORD_SEPARATOR: &str = "; ";

pub struct AuditLog<W: Write> {
    writer: csv::Writer<W>,
}

impl AuditLog<File> {
    pub fn open_append(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;
        Ok(Self::new(file))
    }
}

impl<W: Write> AuditLog<W> {
    pub fn new(inner: W) -> Self {
        let writer = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quote_style(QuoteStyle::NonNumeric)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(inner);
        Self { writer }
    }

    pub fn run_started(&mut self, description: &str) -> Result<()> {
        self.row(&[timestamp(), "Commencing new catalog check ...".to_string()])?;
        self.row(&[timestamp(), description.to_string()])
    }

    pub fn mismatch(
        &mut self,
        processed: usize,
        mismatched: usize,
        action: &str,
        path: &str,
        expected: &ExpectedMetadata,
    ) -> Result<()> {
        self.row(&[
            timestamp(),
            processed.to_string(),
            mismatched.to_string(),
            action.to_string(),
            path.to_string(),
            expected.rating.map(|r| r.to_string()).unwrap_or_default(),
            expected.caption.clone().unwrap_or_default(),
            expected.keywords.join(KEYWORD_SEPARATOR),
        ])
    }

    pub fn write_failure(&mut self, processed: usize, path: &str, report: &WriteReport) -> Result<()> {
        let failures = report
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.field, f.message))
            .collect::<Vec<_>>()
            .join(KEYWORD_SEPARATOR);
        self.row(&[
            timestamp(),
            processed.to_string(),
            "Failed to update following file:".to_string(),
            path.to_string(),
            failures,
        ])
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }

    fn row(&mut self, fields: &[String]) -> Result<()> {
        self.writer.write_record(fields)?;
        self.flush()
    }
}

fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}
