//! Substring line filter.
//!
//! Reads a raw log line by line and writes every line containing the
//! selector (case-sensitive, byte-wise) to a processed file, preserving order
//! and original line terminators. A processed file that ends up empty is
//! deleted: it carries no information and must not reach reconciliation.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use memchr::memmem::Finder;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::FilterError;
use crate::models::{FilterOutcome, FilterResult, ProcessedFile};

/// Line counts for one filtered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterStats {
    pub lines_read: usize,
    pub lines_kept: usize,
}

#[derive(Debug, Clone)]
pub struct LineFilter {
    finder: Finder<'static>,
}

impl LineFilter {
    pub fn new(selector: &str) -> Self {
        Self {
            finder: Finder::new(selector.as_bytes()).into_owned(),
        }
    }

    /// An empty selector matches every line.
    pub fn matches(&self, line: &[u8]) -> bool {
        self.finder.needle().is_empty() || self.finder.find(line).is_some()
    }

    /// Copy the matching lines of `source` into `destination`.
    ///
    /// The destination is created even when nothing matches; callers decide
    /// what to do with an empty result (see [`LineFilter::filter_file`]).
    pub fn filter(&self, source: &Path, destination: &Path) -> Result<FilterStats, FilterError> {
        let read_err = |e| FilterError::Read {
            path: source.to_path_buf(),
            source: e,
        };
        let write_err = |e| FilterError::Write {
            path: destination.to_path_buf(),
            source: e,
        };

        let mut reader = BufReader::new(File::open(source).map_err(read_err)?);
        let mut writer = BufWriter::new(File::create(destination).map_err(write_err)?);

        let mut stats = FilterStats {
            lines_read: 0,
            lines_kept: 0,
        };
        let mut line = Vec::new();
        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line).map_err(read_err)?;
            if n == 0 {
                break;
            }
            stats.lines_read += 1;
            if self.matches(&line) {
                writer.write_all(&line).map_err(write_err)?;
                stats.lines_kept += 1;
            }
        }
        writer.flush().map_err(write_err)?;

        Ok(stats)
    }

    /// Filter one raw file into `processed_dir`, deleting the result if empty.
    ///
    /// A failed filter leaves no processed file behind.
    pub fn filter_file(&self, raw_path: &Path, processed_dir: &Path) -> FilterResult {
        let name = raw_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let destination = processed_dir.join(&name);

        match self.filter(raw_path, &destination) {
            Ok(stats) if stats.lines_kept == 0 => {
                let outcome = match fs::remove_file(&destination) {
                    Ok(()) => FilterOutcome::Discarded,
                    Err(source) => FilterOutcome::Failed(FilterError::Write {
                        path: destination,
                        source,
                    }),
                };
                debug!("{} - no matching lines, processed file removed", name);
                FilterResult {
                    name,
                    lines_read: stats.lines_read,
                    outcome,
                }
            }
            Ok(stats) => {
                debug!("{} - kept {} of {} lines", name, stats.lines_kept, stats.lines_read);
                FilterResult {
                    name,
                    lines_read: stats.lines_read,
                    outcome: FilterOutcome::Kept {
                        path: destination,
                        lines: stats.lines_kept,
                    },
                }
            }
            Err(e) => {
                warn!("{}", e);
                let _ = fs::remove_file(&destination);
                FilterResult {
                    name,
                    lines_read: 0,
                    outcome: FilterOutcome::Failed(e),
                }
            }
        }
    }

    /// Filter every regular file in `raw_dir`, in lexicographic name order.
    ///
    /// One result per raw file; a failure on one file never stops the rest.
    pub fn filter_all(
        &self,
        raw_dir: &Path,
        processed_dir: &Path,
    ) -> Result<Vec<FilterResult>, FilterError> {
        info!("Will refine harvest: {}", raw_dir.display());
        let raw_files = list_files(raw_dir)?;
        Ok(raw_files
            .iter()
            .map(|path| self.filter_file(path, processed_dir))
            .collect())
    }
}

/// Kept processed files from a batch of filter results, in result order.
pub fn processed_files(results: &[FilterResult]) -> Vec<ProcessedFile> {
    results
        .iter()
        .filter_map(|r| match &r.outcome {
            FilterOutcome::Kept { path, .. } => Some(ProcessedFile {
                name: r.name.clone(),
                path: path.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// Regular files directly inside `dir`, sorted by file name.
pub fn list_files(dir: &Path) -> Result<Vec<std::path::PathBuf>, FilterError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| FilterError::Read {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
