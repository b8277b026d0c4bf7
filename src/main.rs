//! # Log Reaper CLI (`reaper`)
//!
//! Harvests log files from a remote host, keeps the lines that mention a
//! selector, and merges them into one time-ordered report.
//!
//! ## Usage
//!
//! ```bash
//! reaper --config ./config/reaper.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `reaper run <SELECTOR>` | Download, filter and reconstruct |
//! | `reaper reconstruct <SELECTOR>` | Filter and reconstruct the last download again, offline |
//! | `reaper list` | Show the remote files that would be harvested |
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Report written |
//! | 1 | Any other error |
//! | 2 | Nothing to reconstruct |
//! | 3 | Connection failure |

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use log_reaper::config::{self, Config};
use log_reaper::error::HarvestError;
use log_reaper::harvest::{self, HarvestRequest};
use log_reaper::logging;
use log_reaper::progress::ProgressMode;
use log_reaper::report::ReportFormat;
use log_reaper::sources;

const DEFAULT_CONFIG: &str = "./config/reaper.toml";

/// Log Reaper: harvest remote logs and reconstruct a single timeline.
#[derive(Parser)]
#[command(
    name = "reaper",
    about = "Harvest remote log files and merge the matching lines into one time-ordered report",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/reaper.toml`; built-in defaults are used when
    /// that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Progress output on stderr: auto, human, json, or off.
    #[arg(long, global = true, default_value = "auto", value_parser = parse_progress)]
    progress: ProgressMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download matching files, filter them, and write the report.
    ///
    /// The working directory is wiped first.
    Run {
        /// Substring a line must contain to be kept (case-sensitive).
        selector: String,

        /// Report format; overrides `[report].format`.
        #[arg(long)]
        format: Option<ReportFormat>,

        /// Report path; defaults to `<workspace>/<report.file_name>`.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Filter and reconstruct the raw files of the previous run, without connecting.
    Reconstruct {
        /// Substring a line must contain to be kept (case-sensitive).
        selector: String,

        #[arg(long)]
        format: Option<ReportFormat>,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Connect and list the remote files matching the name pattern.
    List,
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    ProgressMode::from_flag(s).ok_or_else(|| {
        format!(
            "Unknown progress mode: '{}'. Must be auto, human, json, or off.",
            s
        )
    })
}

fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(p) => config::load_config(p),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            config::load_config(Path::new(DEFAULT_CONFIG))
        }
        None => Ok(Config::minimal()),
    }
}

fn request(
    cfg: &Config,
    selector: String,
    format: Option<ReportFormat>,
    output: Option<PathBuf>,
) -> HarvestRequest {
    HarvestRequest {
        selector,
        format: format.unwrap_or(cfg.report.format),
        output,
    }
}

/// Map an error to the documented exit code.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<HarvestError>() {
        Some(HarvestError::Connection(_)) => 3,
        Some(HarvestError::Empty(_)) => 2,
        _ => 1,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = load(cli.config.as_deref())?;

    if let Err(e) = logging::init(&cfg.logging.level, cfg.logging.file.as_deref()) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    match cli.command {
        Commands::Run {
            selector,
            format,
            output,
        } => {
            let req = request(&cfg, selector, format, output);
            let reporter = Arc::from(cli.progress.reporter());
            let summary = harvest::run_harvest(&cfg, &req, reporter).await?;
            harvest::print_summary("run", &summary);
            summary.ensure_reconstructed().map_err(HarvestError::from)?;
        }
        Commands::Reconstruct {
            selector,
            format,
            output,
        } => {
            let req = request(&cfg, selector, format, output);
            let reporter = cli.progress.reporter();
            let summary = harvest::run_reconstruct(&cfg, &req, reporter.as_ref())?;
            harvest::print_summary("reconstruct", &summary);
            summary.ensure_reconstructed().map_err(HarvestError::from)?;
        }
        Commands::List => {
            sources::list_sources(&cfg)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}
