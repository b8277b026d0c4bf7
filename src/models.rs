//! Core data models used throughout the harvester.
//!
//! These types carry per-file outcomes and reconstructed log records from one
//! pipeline stage to the next.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::PathBuf;

use crate::error::{EmptyReason, EmptyReconstruction, FilterError, TransferError};

/// Outcome of one remote file transfer.
#[derive(Debug)]
pub enum DownloadOutcome {
    Ok { bytes: u64 },
    Failed(TransferError),
}

impl DownloadOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, DownloadOutcome::Ok { .. })
    }

    /// Short status word for progress output.
    pub fn label(&self) -> &'static str {
        match self {
            DownloadOutcome::Ok { .. } => "OK",
            DownloadOutcome::Failed(_) => "Fail",
        }
    }
}

/// One entry per remote file attempted by a batch download.
#[derive(Debug)]
pub struct DownloadResult {
    pub name: String,
    pub outcome: DownloadOutcome,
}

/// Outcome of filtering one raw file.
#[derive(Debug)]
pub enum FilterOutcome {
    /// At least one line matched; the processed file was kept.
    Kept { path: PathBuf, lines: usize },
    /// No line matched; the processed file was deleted.
    Discarded,
    Failed(FilterError),
}

impl FilterOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FilterOutcome::Kept { .. } => "Kept",
            FilterOutcome::Discarded => "Deleted",
            FilterOutcome::Failed(_) => "Fail",
        }
    }
}

/// One entry per raw file offered to the filter stage.
#[derive(Debug)]
pub struct FilterResult {
    pub name: String,
    pub lines_read: usize,
    pub outcome: FilterOutcome,
}

/// A processed file ready for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedFile {
    /// File name, used as the record's source identifier.
    pub name: String,
    pub path: PathBuf,
}

/// A single timestamped line from one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    pub source: String,
    /// Original line text without its terminator.
    pub content: String,
}

/// Render format for record timestamps: millisecond precision, no zone.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

impl LogRecord {
    pub fn timestamp_display(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

fn serialize_timestamp<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

/// Records sorted ascending by timestamp; ties keep encounter order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub records: Vec<LogRecord>,
}

impl Report {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// How a harvest ended once the workspace was ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestStatus {
    Reconstructed,
    Empty(EmptyReason),
}

/// Everything a run did, produced even when nothing was reconstructed.
#[derive(Debug)]
pub struct HarvestSummary {
    /// One entry per remote file attempted; empty for offline reconstruction.
    pub downloads: Vec<DownloadResult>,
    /// One entry per raw file offered to the filter.
    pub filtered: Vec<FilterResult>,
    pub records: usize,
    pub skipped_lines: usize,
    /// Processed files that could not be re-read during reconciliation.
    pub unreadable: Vec<FilterError>,
    /// `None` when there were no processed files to render.
    pub report_path: Option<PathBuf>,
    pub status: HarvestStatus,
}

impl HarvestSummary {
    pub fn downloaded(&self) -> usize {
        self.downloads.iter().filter(|d| d.outcome.is_ok()).count()
    }

    pub fn kept(&self) -> usize {
        self.filtered
            .iter()
            .filter(|f| matches!(f.outcome, FilterOutcome::Kept { .. }))
            .count()
    }

    /// `Err` when the run produced nothing to report.
    pub fn ensure_reconstructed(&self) -> Result<(), EmptyReconstruction> {
        match self.status {
            HarvestStatus::Reconstructed => Ok(()),
            HarvestStatus::Empty(reason) => Err(EmptyReconstruction { reason }),
        }
    }
}
