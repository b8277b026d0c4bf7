//! Error taxonomy for the harvester.
//!
//! Failures are split by how far they propagate:
//!
//! | Error | Scope | Policy |
//! |-------|-------|--------|
//! | [`ConnectionError`] | whole run | fatal, surfaced before any download |
//! | [`TransferError`] | one remote file | recorded in the batch, siblings continue |
//! | [`FilterError`] | one local file | recorded in the batch, siblings continue |
//! | [`EmptyReconstruction`] | whole run | terminal "ran but found nothing" condition |
//!
//! Lines without a recognizable timestamp are not errors at all; the
//! reconciler counts and skips them.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Why a connection attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// The server's host key could not be verified.
    BadHostKey,
    /// The server rejected the credentials.
    AuthFailure,
    /// TCP connect, handshake, or timeout failure.
    NetworkFailure,
    /// Authenticated, but the file-transfer subsystem could not be started.
    SessionFailure,
}

impl fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionErrorKind::BadHostKey => "server's host key could not be verified",
            ConnectionErrorKind::AuthFailure => "authentication failure",
            ConnectionErrorKind::NetworkFailure => "connection failure",
            ConnectionErrorKind::SessionFailure => "SFTP session failure",
        };
        f.write_str(label)
    }
}

/// A connection could not be established. Never retried automatically.
#[derive(Debug, Error)]
#[error("Connection error - {target} - {kind}: {message}")]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    /// `user@host:port` of the attempted connection.
    pub target: String,
    pub message: String,
}

impl ConnectionError {
    pub fn new(
        kind: ConnectionErrorKind,
        target: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        Self {
            kind,
            target: target.into(),
            message: message.to_string(),
        }
    }
}

/// Failure while listing or fetching remote files.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A listing or download was requested without an established session.
    #[error("No file-transfer session is established")]
    NotConnected,

    /// The remote directory could not be listed.
    #[error("Failed to list remote directory '{dir}': {source}")]
    Listing {
        dir: String,
        #[source]
        source: std::io::Error,
    },

    /// A single file transfer failed.
    #[error("Failed to download '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The batch deadline passed before this file was attempted.
    #[error("Skipped '{name}': download deadline exceeded")]
    DeadlineExceeded { name: String },
}

/// Failure while filtering (or re-reading) a local log file.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a run produced nothing to reconstruct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    /// Every processed file was empty after filtering (or none were downloaded).
    NoProcessedFiles,
    /// Processed files exist, but none of their lines carry a timestamp.
    NoTimestampedLines,
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmptyReason::NoProcessedFiles => f.write_str("No refined logs are available"),
            EmptyReason::NoTimestampedLines => {
                f.write_str("No timestamped lines found in refined logs")
            }
        }
    }
}

/// The pipeline ran to completion but found nothing to put in the report.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{reason}")]
pub struct EmptyReconstruction {
    pub reason: EmptyReason,
}

/// Top-level error for a harvest run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A failure that prevents the batch from starting, e.g. the remote
    /// directory cannot be listed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The raw directory itself could not be read.
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("Failed to prepare workspace {path:?}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write report {path:?}: {source}")]
    Render {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Empty(#[from] EmptyReconstruction),
}
