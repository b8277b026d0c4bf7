//! Harvest progress reporting.
//!
//! Reports per-file progress during `reaper run` and `reaper reconstruct` so
//! users see which files were fetched, which were kept after filtering, and
//! how many records made it into the report. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// Pipeline stage an event belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HarvestPhase {
    Download,
    Filter,
    Reconstruct,
}

impl HarvestPhase {
    fn as_str(&self) -> &'static str {
        match self {
            HarvestPhase::Download => "download",
            HarvestPhase::Filter => "filter",
            HarvestPhase::Reconstruct => "reconstruct",
        }
    }
}

/// A single progress event for a harvest.
#[derive(Clone, Debug)]
pub enum HarvestProgressEvent {
    /// A stage is starting with `total` files to handle.
    Started { phase: HarvestPhase, total: u64 },
    /// One file finished a stage. `status` is the short outcome word
    /// (`OK`, `Fail`, `Kept`, `Deleted`).
    File {
        phase: HarvestPhase,
        name: String,
        status: &'static str,
    },
    /// The report has been assembled.
    Reconstructed { records: u64, skipped: u64 },
}

/// Reports harvest progress. Implementations write to stderr (human or JSON).
pub trait HarvestProgressReporter: Send + Sync {
    fn report(&self, event: HarvestProgressEvent);
}

/// Human-friendly progress on stderr, one dotted line per file:
/// `    A.log............................OK`.
pub struct StderrProgress;

impl HarvestProgressReporter for StderrProgress {
    fn report(&self, event: HarvestProgressEvent) {
        let line = match &event {
            HarvestProgressEvent::Started { phase, total } => {
                format!("{}  {} file(s)\n", phase.as_str(), format_number(*total))
            }
            HarvestProgressEvent::File { name, status, .. } => {
                format!("{}\n", file_line(name, status))
            }
            HarvestProgressEvent::Reconstructed { records, skipped } => format!(
                "reconstruct  {} record(s), {} untimed line(s) skipped\n",
                format_number(*records),
                format_number(*skipped)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl HarvestProgressReporter for JsonProgress {
    fn report(&self, event: HarvestProgressEvent) {
        let obj = match &event {
            HarvestProgressEvent::Started { phase, total } => serde_json::json!({
                "event": "progress",
                "phase": phase.as_str(),
                "total": total
            }),
            HarvestProgressEvent::File {
                phase,
                name,
                status,
            } => serde_json::json!({
                "event": "file",
                "phase": phase.as_str(),
                "name": name,
                "status": status
            }),
            HarvestProgressEvent::Reconstructed { records, skipped } => serde_json::json!({
                "event": "reconstructed",
                "phase": HarvestPhase::Reconstruct.as_str(),
                "records": records,
                "skipped": skipped
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl HarvestProgressReporter for NoProgress {
    fn report(&self, _event: HarvestProgressEvent) {}
}

/// `    name.........status`, the per-file line shared with the run summary.
pub fn file_line(name: &str, status: &str) -> String {
    format!("    {:.<30}...{}", name, status)
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse a `--progress` value; `auto` defers to [`default_for_tty`](Self::default_for_tty).
    pub fn from_flag(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(Self::default_for_tty()),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            "off" => Some(ProgressMode::Off),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn HarvestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1), "1");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn dotted_file_line_pads_to_thirty() {
        assert_eq!(file_line("A.log", "OK"), "    A.log............................OK");
    }

    #[test]
    fn progress_flag_values() {
        assert_eq!(ProgressMode::from_flag("off"), Some(ProgressMode::Off));
        assert_eq!(ProgressMode::from_flag("json"), Some(ProgressMode::Json));
        assert_eq!(ProgressMode::from_flag("human"), Some(ProgressMode::Human));
        assert!(ProgressMode::from_flag("auto").is_some());
        assert_eq!(ProgressMode::from_flag("loud"), None);
    }
}
