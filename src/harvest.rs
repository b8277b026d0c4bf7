//! Harvest pipeline orchestration.
//!
//! Coordinates the full run: workspace → connect → download → disconnect →
//! filter → reconcile → render. Per-file failures are recorded in the
//! [`HarvestSummary`] and never abort the batch; only a connection failure,
//! an unlistable remote directory, or an unusable workspace stop the run.
//!
//! The transport is blocking, so the connect/download stage runs on the
//! blocking pool. The connection is released before filtering starts, on
//! every path.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{expand_home, Config, Protocol};
use crate::connector_local::LocalChannel;
use crate::connector_sftp::SftpChannel;
use crate::error::{FilterError, HarvestError};
use crate::filter::{self, LineFilter};
use crate::models::{
    DownloadOutcome, DownloadResult, FilterOutcome, HarvestStatus, HarvestSummary,
};
use crate::progress::{file_line, HarvestPhase, HarvestProgressEvent, HarvestProgressReporter};
use crate::reconcile::Reconciler;
use crate::report::{self, ReportFormat};
use crate::transport::{SecureChannel, Transport};
use crate::workspace::Workspace;

/// What to look for and where to put the result.
#[derive(Debug, Clone)]
pub struct HarvestRequest {
    /// Substring a line must contain to be kept.
    pub selector: String,
    pub format: ReportFormat,
    /// Report destination; defaults to `<workspace>/<report.file_name>`.
    pub output: Option<PathBuf>,
}

/// Build the configured channel and connect it.
pub fn connect_transport(config: &Config) -> Result<Transport> {
    let channel: Box<dyn SecureChannel> = match config.remote.protocol {
        Protocol::Sftp => Box::new(SftpChannel::new(
            config.remote.known_hosts_path(),
            config.remote.strict_host_key,
        )),
        Protocol::Local => Box::new(LocalChannel::new(expand_home(Path::new(&config.remote.dir)))),
    };
    let params = config.remote.connect_params()?;

    let mut transport = Transport::new(channel).with_batch_timeout(config.remote.batch_timeout());
    transport.connect(&params).map_err(HarvestError::from)?;
    Ok(transport)
}

/// Download, filter and reconstruct in one go.
pub async fn run_harvest(
    config: &Config,
    request: &HarvestRequest,
    reporter: Arc<dyn HarvestProgressReporter>,
) -> Result<HarvestSummary> {
    let workspace = Workspace::new(config.workspace.root());
    workspace.prepare()?;

    let download_config = config.clone();
    let raw_dir = workspace.raw_dir().to_path_buf();
    let download_reporter = reporter.clone();
    let downloads = tokio::task::spawn_blocking(move || {
        download_stage(&download_config, &raw_dir, download_reporter.as_ref())
    })
    .await
    .context("Download task failed")??;

    reconstruct_stage(config, request, &workspace, downloads, reporter.as_ref())
}

/// Re-run filter, reconcile and render on the raw files of an earlier harvest.
pub fn run_reconstruct(
    config: &Config,
    request: &HarvestRequest,
    reporter: &dyn HarvestProgressReporter,
) -> Result<HarvestSummary> {
    let workspace = Workspace::new(config.workspace.root());
    workspace.reopen()?;
    reconstruct_stage(config, request, &workspace, Vec::new(), reporter)
}

fn download_stage(
    config: &Config,
    raw_dir: &Path,
    reporter: &dyn HarvestProgressReporter,
) -> Result<Vec<DownloadResult>> {
    let pattern = config.remote.name_pattern()?;
    let mut transport = connect_transport(config)?;

    let results: Vec<DownloadResult> = {
        let batch = transport
            .download_all(config.remote.listing_dir(), raw_dir, &pattern)
            .map_err(HarvestError::from)?;
        reporter.report(HarvestProgressEvent::Started {
            phase: HarvestPhase::Download,
            total: batch.len() as u64,
        });
        batch
            .inspect(|r| {
                reporter.report(HarvestProgressEvent::File {
                    phase: HarvestPhase::Download,
                    name: r.name.clone(),
                    status: r.outcome.label(),
                })
            })
            .collect()
    };

    // Dropping the transport would also disconnect; do it here so the
    // close is logged before filtering starts.
    transport.disconnect();
    Ok(results)
}

fn reconstruct_stage(
    config: &Config,
    request: &HarvestRequest,
    workspace: &Workspace,
    downloads: Vec<DownloadResult>,
    reporter: &dyn HarvestProgressReporter,
) -> Result<HarvestSummary> {
    let line_filter = LineFilter::new(&request.selector);
    let filtered = line_filter
        .filter_all(workspace.raw_dir(), workspace.processed_dir())
        .map_err(HarvestError::from)?;

    reporter.report(HarvestProgressEvent::Started {
        phase: HarvestPhase::Filter,
        total: filtered.len() as u64,
    });
    for result in &filtered {
        reporter.report(HarvestProgressEvent::File {
            phase: HarvestPhase::Filter,
            name: result.name.clone(),
            status: result.outcome.label(),
        });
    }

    let processed = filter::processed_files(&filtered);
    let reconciler = Reconciler::new(config.timestamps.parser()?);
    let reconciliation = reconciler.reconcile(&processed);
    reporter.report(HarvestProgressEvent::Reconstructed {
        records: reconciliation.report.len() as u64,
        skipped: reconciliation.skipped_lines as u64,
    });

    let status = match reconciliation.check_not_empty(processed.len()) {
        Ok(()) => HarvestStatus::Reconstructed,
        Err(empty) => {
            warn!("{}", empty);
            HarvestStatus::Empty(empty.reason)
        }
    };

    let report_path = if processed.is_empty() {
        None
    } else {
        let path = request
            .output
            .clone()
            .unwrap_or_else(|| workspace.root().join(&config.report.file_name));
        report::write_report(&reconciliation.report, request.format, &path).map_err(|source| {
            HarvestError::Render {
                path: path.clone(),
                source,
            }
        })?;
        info!("Report written to {}", path.display());
        Some(path)
    };

    Ok(HarvestSummary {
        downloads,
        filtered,
        records: reconciliation.report.len(),
        skipped_lines: reconciliation.skipped_lines,
        unreadable: reconciliation.failures,
        report_path,
        status,
    })
}

/// Print a run summary on stdout.
/// Render the end-of-run summary.
///
/// Counts first, then one line per file that failed or was dropped, so a
/// partial harvest names the files it is missing.
pub fn format_summary(command: &str, summary: &HarvestSummary) -> String {
    let mut lines = vec![command.to_string()];
    if !summary.downloads.is_empty() {
        lines.push(format!(
            "  downloaded: {} of {} files",
            summary.downloaded(),
            summary.downloads.len()
        ));
        for result in &summary.downloads {
            if let DownloadOutcome::Failed(e) = &result.outcome {
                lines.push(file_line(&result.name, &format!("Fail - {}", e)));
            }
        }
    }
    lines.push(format!(
        "  kept after filter: {} of {} files",
        summary.kept(),
        summary.filtered.len()
    ));
    for result in &summary.filtered {
        match &result.outcome {
            FilterOutcome::Kept { .. } => {}
            FilterOutcome::Discarded => lines.push(file_line(&result.name, "Deleted")),
            FilterOutcome::Failed(e) => {
                lines.push(file_line(&result.name, &format!("Fail - {}", e)))
            }
        }
    }
    lines.push(format!(
        "  records: {} ({} untimed lines skipped)",
        summary.records, summary.skipped_lines
    ));
    if !summary.unreadable.is_empty() {
        lines.push(format!(
            "  unreadable processed files: {}",
            summary.unreadable.len()
        ));
        for e in &summary.unreadable {
            lines.push(file_line(&failed_file_name(e), &format!("Fail - {}", e)));
        }
    }
    if let Some(path) = &summary.report_path {
        lines.push(format!("  report: {}", path.display()));
    }
    lines.push(match summary.status {
        HarvestStatus::Reconstructed => "ok".to_string(),
        HarvestStatus::Empty(reason) => format!("empty: {}", reason),
    });
    lines.join("\n")
}

fn failed_file_name(e: &FilterError) -> String {
    let path = match e {
        FilterError::Read { path, .. } | FilterError::Write { path, .. } => path,
    };
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn print_summary(command: &str, summary: &HarvestSummary) {
    println!("{}", format_summary(command, summary));
}
