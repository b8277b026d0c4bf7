//! Cross-file chronological reconstruction.
//!
//! Every line of every processed file is offered to the [`TimestampParser`].
//! Lines without a timestamp (banners, stack-trace continuations) are counted
//! and skipped. The remaining records are stably sorted by timestamp, so
//! records with equal timestamps keep their encounter order: files are
//! visited in lexicographic name order, lines in file order.

use std::fs::File;
use std::io::{BufRead, BufReader};

use tracing::{debug, info, warn};

use crate::error::{EmptyReason, EmptyReconstruction, FilterError};
use crate::models::{LogRecord, ProcessedFile, Report};
use crate::timestamp::TimestampParser;

/// Result of reconciling a set of processed files.
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub report: Report,
    /// Lines dropped because no pattern matched them.
    pub skipped_lines: usize,
    /// Processed files that could not be read; their lines are absent.
    pub failures: Vec<FilterError>,
}

impl Reconciliation {
    /// `Err` when there is nothing to put in a report.
    pub fn check_not_empty(&self, files_offered: usize) -> Result<(), EmptyReconstruction> {
        if files_offered == 0 {
            Err(EmptyReconstruction {
                reason: EmptyReason::NoProcessedFiles,
            })
        } else if self.report.is_empty() {
            Err(EmptyReconstruction {
                reason: EmptyReason::NoTimestampedLines,
            })
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    parser: TimestampParser,
}

impl Reconciler {
    pub fn new(parser: TimestampParser) -> Self {
        Self { parser }
    }

    /// Merge `files` into one time-ordered report.
    pub fn reconcile(&self, files: &[ProcessedFile]) -> Reconciliation {
        let mut ordered: Vec<&ProcessedFile> = files.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        let mut result = Reconciliation::default();
        for file in ordered {
            let reader = match File::open(&file.path) {
                Ok(f) => BufReader::new(f),
                Err(source) => {
                    warn!("Cannot reopen processed file {}: {}", file.path.display(), source);
                    result.failures.push(FilterError::Read {
                        path: file.path.clone(),
                        source,
                    });
                    continue;
                }
            };
            match self.collect_records(&file.name, reader, &mut result.report.records) {
                Ok(skipped) => result.skipped_lines += skipped,
                Err(source) => {
                    warn!("Failed reading {}: {}", file.path.display(), source);
                    result.failures.push(FilterError::Read {
                        path: file.path.clone(),
                        source,
                    });
                }
            }
        }

        result.report.records.sort_by_key(|r| r.timestamp);
        info!(
            "Reconstructed {} record(s), skipped {} untimed line(s)",
            result.report.len(),
            result.skipped_lines
        );
        result
    }

    /// Append the timestamped lines of one source to `records`.
    ///
    /// Returns the number of lines skipped for lack of a timestamp. Records
    /// already appended before an I/O error are kept.
    pub fn collect_records<R: BufRead>(
        &self,
        source: &str,
        mut reader: R,
        records: &mut Vec<LogRecord>,
    ) -> std::io::Result<usize> {
        let mut skipped = 0;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(strip_terminator(&buf));
            match self.parser.extract(&line) {
                Some(timestamp) => records.push(LogRecord {
                    timestamp,
                    source: source.to_string(),
                    content: line.into_owned(),
                }),
                None => skipped += 1,
            }
        }
        debug!("{} - {} untimed line(s)", source, skipped);
        Ok(skipped)
    }
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::{DMY_PATTERN, YMD_PATTERN};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, body: &str) -> ProcessedFile {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        ProcessedFile {
            name: name.to_string(),
            path,
        }
    }

    fn contents(report: &Report) -> Vec<&str> {
        report.records.iter().map(|r| r.content.as_str()).collect()
    }

    #[test]
    fn merges_heterogeneous_formats_chronologically() {
        let tmp = TempDir::new().unwrap();
        let a = write(tmp.path(), "A.log", "01-01-2024 10:00:00.000 -- hello\n");
        let b = write(tmp.path(), "B.log", "2024-01-01 09:59:59.500 -- world\n");

        let result = Reconciler::default().reconcile(&[a, b]);
        let records = &result.report.records;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source, "B.log");
        assert_eq!(records[0].content, "2024-01-01 09:59:59.500 -- world");
        assert_eq!(records[1].source, "A.log");
        assert_eq!(records[1].content, "01-01-2024 10:00:00.000 -- hello");
    }

    #[test]
    fn untimed_lines_are_skipped_silently() {
        let tmp = TempDir::new().unwrap();
        let a = write(
            tmp.path(),
            "A.log",
            "not a timestamp -- banner\n01-01-2024 10:00:00.000 -- hello\n",
        );

        let result = Reconciler::default().reconcile(&[a]);
        assert_eq!(contents(&result.report), vec!["01-01-2024 10:00:00.000 -- hello"]);
        assert_eq!(result.skipped_lines, 1);
        assert!(result.failures.is_empty());
        assert!(result.check_not_empty(1).is_ok());
    }

    #[test]
    fn equal_timestamps_keep_file_then_line_order() {
        let tmp = TempDir::new().unwrap();
        let b = write(
            tmp.path(),
            "B.log",
            "2024-01-01 12:00:00.000 -- b1\n2024-01-01 12:00:00.000 -- b2\n",
        );
        let a = write(
            tmp.path(),
            "A.log",
            "01-01-2024 12:00:00.000 -- a1\n01-01-2024 12:00:00.000 -- a2\n",
        );

        // Offered out of order; visited by name.
        let result = Reconciler::default().reconcile(&[b, a]);
        assert_eq!(
            contents(&result.report),
            vec![
                "01-01-2024 12:00:00.000 -- a1",
                "01-01-2024 12:00:00.000 -- a2",
                "2024-01-01 12:00:00.000 -- b1",
                "2024-01-01 12:00:00.000 -- b2",
            ]
        );
    }

    #[test]
    fn interleaves_lines_across_files() {
        let tmp = TempDir::new().unwrap();
        let a = write(
            tmp.path(),
            "A.log",
            "01-01-2024 10:00:00.000 -- a1\n01-01-2024 10:00:02.000 -- a2\n",
        );
        let b = write(
            tmp.path(),
            "B.log",
            "2024-01-01 10:00:01.000 -- b1\n2024-01-01 10:00:03.000 -- b2\n",
        );

        let result = Reconciler::default().reconcile(&[a, b]);
        let sources: Vec<_> = result.report.records.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["A.log", "B.log", "A.log", "B.log"]);
    }

    #[test]
    fn reconciliation_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let files = vec![
            write(tmp.path(), "C.log", "2024-03-01 00:00:00.000 -- c\n"),
            write(tmp.path(), "A.log", "01-03-2024 00:00:00.000 -- a\nbanner\n"),
            write(tmp.path(), "B.log", "2024-02-29 23:59:59.999 -- b\n"),
        ];
        let reconciler = Reconciler::default();
        let first = reconciler.reconcile(&files);
        let second = reconciler.reconcile(&files);
        assert_eq!(first.report, second.report);
    }

    #[test]
    fn empty_file_set_is_distinct_empty_condition() {
        let result = Reconciler::default().reconcile(&[]);
        assert!(result.report.is_empty());
        assert_eq!(
            result.check_not_empty(0),
            Err(EmptyReconstruction {
                reason: EmptyReason::NoProcessedFiles
            })
        );
    }

    #[test]
    fn files_without_timestamps_yield_empty_report() {
        let tmp = TempDir::new().unwrap();
        let a = write(tmp.path(), "A.log", "banner only\n");
        let result = Reconciler::default().reconcile(&[a]);
        assert!(result.report.is_empty());
        assert_eq!(
            result.check_not_empty(1),
            Err(EmptyReconstruction {
                reason: EmptyReason::NoTimestampedLines
            })
        );
    }

    #[test]
    fn missing_file_is_reported_and_others_survive() {
        let tmp = TempDir::new().unwrap();
        let a = write(tmp.path(), "A.log", "2024-01-01 00:00:00.000 -- a\n");
        let ghost = ProcessedFile {
            name: "Z.log".to_string(),
            path: tmp.path().join("Z.log"),
        };
        let result = Reconciler::default().reconcile(&[a, ghost]);
        assert_eq!(result.report.len(), 1);
        assert_eq!(result.failures.len(), 1);
    }

    #[test]
    fn strips_crlf_terminators() {
        let reconciler = Reconciler::default();
        let mut records = Vec::new();
        let skipped = reconciler
            .collect_records(
                "W.log",
                "2024-01-01 00:00:00.000 -- windows\r\n".as_bytes(),
                &mut records,
            )
            .unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(records[0].content, "2024-01-01 00:00:00.000 -- windows");
    }

    #[test]
    fn pattern_order_is_honoured_by_reconciler() {
        let line = "2024-01-02 03:04:05.006 copy of 05-06-2023 07:08:09.010\n";
        let dmy_first =
            Reconciler::new(TimestampParser::from_patterns(&[DMY_PATTERN, YMD_PATTERN]).unwrap());
        let mut records = Vec::new();
        dmy_first
            .collect_records("X.log", line.as_bytes(), &mut records)
            .unwrap();
        assert_eq!(
            records[0].timestamp.format("%Y-%m-%d").to_string(),
            "2023-06-05"
        );
    }
}
