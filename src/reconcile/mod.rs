//! Catalog-to-file reconciliation.
//!
//! Each catalog record is handled on its own: the file is read through a
//! [`MetadataStore`], compared with what the catalog says, and in update mode
//! rewritten to match the catalog. Unreadable files and partial write
//! failures are counted and the run continues; any other error aborts it.

pub mod audit;
pub mod confirm;

pub use audit::AuditLog;
pub use confirm::{AssumeYes, Confirm, TerminalPrompt};

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, CatalogRecord, RecordFilter};
use crate::filemeta::{FileMetadata, MetadataStore, SkipList};

pub const DEFAULT_CATEGORIES: &[&str] = &["People", "Places", "Events", "Other"];
pub const DEFAULT_AUTOMATION_TAGS: &[&str] = &["Auto Face Tagging"];
pub const DEFAULT_KEYWORD_DELIMITER: &str = "|";
pub const DEFAULT_PROGRESS_INTERVAL: usize = 1000;

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Rewrite mismatching files instead of only reporting them.
    pub update: bool,
    /// Prepended to each stored path, e.g. the drive letter the catalog dropped.
    pub path_prefix: String,
    pub categories: Vec<String>,
    /// Tag paths containing any of these names are ignored.
    pub automation_tags: Vec<String>,
    pub delimiter: String,
    pub skip_list: SkipList,
    /// Report progress every this many records; 0 disables.
    pub progress_interval: usize,
    pub filter: RecordFilter,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            update: false,
            path_prefix: String::new(),
            categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
            automation_tags: DEFAULT_AUTOMATION_TAGS.iter().map(|s| s.to_string()).collect(),
            delimiter: DEFAULT_KEYWORD_DELIMITER.to_string(),
            skip_list: SkipList::default(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            filter: RecordFilter::default(),
        }
    }
}

impl ReconcileOptions {
    /// One-line description of what a run with these options will do.
    pub fn describe(&self) -> String {
        let taken = match self.filter.taken_after {
            Some(date) => format!("taken after {} ", date.format("%d/%m/%Y")),
            None => String::new(),
        };
        if self.update {
            format!(
                "Update mode on - all images {}not aligned to the catalog will have their metadata updated.",
                taken
            )
        } else {
            format!("Update mode off - all images {}will be checked but not updated.", taken)
        }
    }
}

/// What the catalog says a file should carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpectedMetadata {
    pub keywords: Vec<String>,
    pub rating: Option<i64>,
    pub caption: Option<String>,
}

impl ExpectedMetadata {
    /// No rating, caption or keywords to compare. A zero rating is "unrated".
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.rating.unwrap_or(0) == 0 && self.caption.is_none()
    }

    pub fn to_file_metadata(&self) -> FileMetadata {
        FileMetadata {
            keywords: if self.keywords.is_empty() {
                None
            } else {
                Some(self.keywords.clone())
            },
            rating: self.rating,
            caption: self.caption.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Match,
    Mismatch,
}

/// Result of examining one record, without acting on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RecordCheck {
    Unreadable {
        path: String,
        reason: String,
    },
    Checked {
        path: String,
        expected: ExpectedMetadata,
        file: FileMetadata,
        verdict: Verdict,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub matched: usize,
    pub unreadable: usize,
    pub mismatched: usize,
    pub updated: usize,
    pub write_failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Cancelled,
    Completed(RunSummary),
}

/// Keywords a file should carry for the given tag paths: one per path rooted
/// at a category, segments joined by `delimiter`.
pub fn expected_keywords(
    paths: &[Vec<String>],
    categories: &[String],
    automation_tags: &[String],
    delimiter: &str,
) -> Vec<String> {
    paths
        .iter()
        .filter(|path| !path.iter().any(|segment| automation_tags.contains(segment)))
        .filter(|path| path.first().map_or(false, |first| categories.contains(first)))
        .map(|path| path.join(delimiter))
        .collect()
}

pub fn compute_verdict(expected: &ExpectedMetadata, file: &FileMetadata) -> Verdict {
    if expected.is_empty() {
        return Verdict::Match;
    }

    let keywords_present = expected.keywords.iter().all(|keyword| {
        file.keywords
            .as_ref()
            .map_or(false, |found| found.contains(keyword))
    });
    let rating_equal = expected.rating == file.rating;
    let caption_equal = match (&expected.caption, &file.caption) {
        (Some(wanted), Some(found)) => wanted == found,
        (Some(_), None) => false,
        (None, _) => true,
    };

    if keywords_present && rating_equal && caption_equal {
        Verdict::Match
    } else {
        Verdict::Mismatch
    }
}

pub struct Reconciler<'a, S: MetadataStore + ?Sized> {
    catalog: &'a Catalog,
    store: &'a S,
    options: ReconcileOptions,
}

impl<'a, S: MetadataStore + ?Sized> Reconciler<'a, S> {
    pub fn new(catalog: &'a Catalog, store: &'a S, options: ReconcileOptions) -> Self {
        Self {
            catalog,
            store,
            options,
        }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    pub fn file_path(&self, record: &CatalogRecord) -> String {
        format!("{}{}", self.options.path_prefix, record.full_filepath)
    }

    /// Catalog-side truth for one record.
    pub fn expected_for(&self, record_id: i64) -> Result<ExpectedMetadata> {
        let paths = self.catalog.tags_for_record(record_id)?;
        let keywords = expected_keywords(
            &paths,
            &self.options.categories,
            &self.options.automation_tags,
            &self.options.delimiter,
        );
        let rating = self.catalog.rating_for_record(record_id)?;
        let caption = self
            .catalog
            .caption_for_record(record_id)?
            .filter(|caption| !caption.is_empty());
        Ok(ExpectedMetadata {
            keywords,
            rating,
            caption,
        })
    }

    pub fn check_record(&self, record: &CatalogRecord) -> Result<RecordCheck> {
        let path = self.file_path(record);

        if self.options.skip_list.is_skipped(Path::new(&path)) {
            return Ok(RecordCheck::Unreadable {
                path,
                reason: "extension on skip list".to_string(),
            });
        }

        let file = match self.store.read(Path::new(&path)) {
            Ok(file) => file,
            Err(e) => {
                return Ok(RecordCheck::Unreadable {
                    path,
                    reason: e.to_string(),
                })
            }
        };

        let expected = self.expected_for(record.id)?;
        let verdict = compute_verdict(&expected, &file);
        Ok(RecordCheck::Checked {
            path,
            expected,
            file,
            verdict,
        })
    }

    /// Walk every selected record. In update mode `confirm` is asked first.
    ///
    /// `on_progress` receives the running counters every
    /// `progress_interval` records.
    pub fn run<W: Write>(
        &self,
        confirm: &mut dyn Confirm,
        audit: &mut AuditLog<W>,
        on_progress: &mut dyn FnMut(&RunSummary),
    ) -> Result<RunOutcome> {
        let description = self.options.describe();
        if self.options.update && !confirm.confirm("WARNING", &description) {
            info!("Run cancelled before processing");
            return Ok(RunOutcome::Cancelled);
        }

        info!("{}", description);
        audit.run_started(&description)?;

        let records = self.catalog.records(&self.options.filter)?;
        info!(records = records.len(), "Commencing");

        let mut summary = RunSummary::default();
        for record in &records {
            if let Err(e) = self.process(record, &mut summary, audit) {
                error!(
                    media_id = record.id,
                    processed = summary.processed,
                    "Unexpected error: {:#}",
                    e
                );
                if let Err(flush_error) = audit.flush() {
                    error!("Failed to flush audit log: {:#}", flush_error);
                }
                return Err(e.context(format!("Reconciliation aborted at media id {}", record.id)));
            }

            summary.processed += 1;
            let interval = self.options.progress_interval;
            if interval > 0 && summary.processed % interval == 0 {
                info!(
                    processed = summary.processed,
                    matched = summary.matched,
                    unreadable = summary.unreadable,
                    "Progress"
                );
                on_progress(&summary);
            }
        }

        audit.flush()?;
        info!(
            processed = summary.processed,
            matched = summary.matched,
            unreadable = summary.unreadable,
            mismatched = summary.mismatched,
            updated = summary.updated,
            write_failures = summary.write_failures,
            "Run complete"
        );
        Ok(RunOutcome::Completed(summary))
    }

    fn process<W: Write>(
        &self,
        record: &CatalogRecord,
        summary: &mut RunSummary,
        audit: &mut AuditLog<W>,
    ) -> Result<()> {
        let (path, expected) = match self.check_record(record)? {
            RecordCheck::Unreadable { path, reason } => {
                debug!(media_id = record.id, path = %path, "Unreadable: {}", reason);
                summary.unreadable += 1;
                return Ok(());
            }
            RecordCheck::Checked {
                verdict: Verdict::Match,
                ..
            } => {
                summary.matched += 1;
                return Ok(());
            }
            RecordCheck::Checked { path, expected, .. } => (path, expected),
        };

        summary.mismatched += 1;
        debug!(media_id = record.id, path = %path, "Does not match catalog");

        let action = if self.options.update {
            "Updated following file with rating, caption and keywords:"
        } else {
            "Would have updated following file with rating, caption and keywords:"
        };
        audit
            .mismatch(summary.processed, summary.mismatched, action, &path, &expected)
            .context("Failed to write audit log")?;

        if self.options.update {
            let report = self.store.write(Path::new(&path), &expected.to_file_metadata());
            if report.is_success() {
                summary.updated += 1;
            } else {
                summary.write_failures += 1;
                warn!(media_id = record.id, path = %path, failures = ?report.failures, "Metadata update incomplete");
                audit.write_failure(summary.processed, &path, &report)?;
            }
        }

        Ok(())
    }
}
