//! # Log Reaper
//!
//! Harvests log files from a remote host and reconstructs one chronological
//! view of the lines that mention a selector.
//!
//! Each service writes its own log in its own timestamp format; following a
//! single request across them means reading several files side by side.
//! Log Reaper downloads the files, keeps only the matching lines, parses the
//! timestamps whatever their format, and renders a single time-ordered
//! report.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐
//! │  Transport   │──▶│  raw/    │──▶│  Filter  │──▶│ Reconcile │──▶│  Report  │
//! │ SFTP / local │   │          │   │processed/│   │ timestamps│   │HTML/JSON │
//! └──────────────┘   └──────────┘   └──────────┘   └───────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export REAPER_PASSWORD=...
//! reaper list                          # what would be harvested
//! reaper run "request_id=42"           # download, filter, reconstruct
//! reaper reconstruct "user=7"          # same raw files, new selector
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error types |
//! | [`models`] | Per-file outcomes, records, run summary |
//! | [`sources`] | File-name pattern and the `list` command |
//! | [`transport`] | Connection lifecycle and batch download |
//! | [`connector_sftp`] | SFTP channel |
//! | [`connector_local`] | Directory-backed channel |
//! | [`workspace`] | Local working directories |
//! | [`filter`] | Substring line filter |
//! | [`timestamp`] | Multi-format timestamp extraction |
//! | [`reconcile`] | Chronological merge |
//! | [`report`] | HTML and JSON rendering |
//! | [`progress`] | Progress reporting on stderr |
//! | [`logging`] | Tracing subscriber setup |
//! | [`harvest`] | Pipeline orchestration |

pub mod config;
pub mod connector_local;
pub mod connector_sftp;
pub mod error;
pub mod filter;
pub mod harvest;
pub mod logging;
pub mod models;
pub mod progress;
pub mod reconcile;
pub mod report;
pub mod sources;
pub mod timestamp;
pub mod transport;
pub mod workspace;
