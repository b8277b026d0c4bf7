//! Connection lifecycle and batch download.
//!
//! A [`Transport`] exclusively owns one [`SecureChannel`] and walks it through
//!
//! ```text
//! Disconnected ──connect──▶ Connected ──open session──▶ SessionEstablished
//!       ▲                       │                               │
//!       └────── failure ────────┘                          disconnect
//!                                                               ▼
//!                                                             Closed
//! ```
//!
//! Listing and downloading require `SessionEstablished`. A failed connect
//! always tears down whatever was opened and leaves the transport
//! `Disconnected`; nothing is retried. [`Transport::disconnect`] is
//! idempotent and also runs on drop, so the connection is released on every
//! exit path.
//!
//! [`Transport::download_all`] returns a lazy iterator yielding exactly one
//! [`DownloadResult`] per listed file, in listing order. A failed transfer is
//! recorded and the batch moves on.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::error::{ConnectionError, TransferError};
use crate::models::{DownloadOutcome, DownloadResult};
use crate::sources::NamePattern;

/// Parameters for one connection attempt.
#[derive(Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub connect_timeout: Duration,
    /// Per-operation timeout once connected. Zero disables it.
    pub io_timeout: Duration,
}

impl ConnectParams {
    /// `user@host:port`, used in log lines and error messages.
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .field("io_timeout", &self.io_timeout)
            .finish()
    }
}

/// The secure-transport collaborator.
///
/// Implementations are driven exclusively by [`Transport`], which guarantees
/// the call order: `connect`, then `open_file_session`, then any number of
/// `resolve_dir`/`list_dir`/`fetch`, then `close_file_session` and
/// `close_connection`. The close methods must tolerate being called on parts
/// that were never opened.
pub trait SecureChannel: Send {
    /// Short protocol label for log lines (`"sftp"`, `"local"`).
    fn protocol(&self) -> &str;

    /// Establish and authenticate the underlying connection.
    fn connect(&mut self, params: &ConnectParams) -> Result<(), ConnectionError>;

    /// Start the file-transfer session on an established connection.
    fn open_file_session(&mut self, params: &ConnectParams) -> Result<(), ConnectionError>;

    /// Normalize a remote directory; the empty string is the login directory.
    fn resolve_dir(&mut self, dir: &str) -> io::Result<String>;

    /// Names of the regular files in `dir`.
    fn list_dir(&mut self, dir: &str) -> io::Result<Vec<String>>;

    /// Copy `dir/name` to `local_path`, returning the number of bytes written.
    fn fetch(&mut self, dir: &str, name: &str, local_path: &Path) -> io::Result<u64>;

    fn close_file_session(&mut self);

    fn close_connection(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    SessionEstablished,
    Closed,
}

pub struct Transport {
    channel: Box<dyn SecureChannel>,
    state: ConnectionState,
    batch_timeout: Option<Duration>,
}

impl Transport {
    pub fn new(channel: Box<dyn SecureChannel>) -> Self {
        Self {
            channel,
            state: ConnectionState::Disconnected,
            batch_timeout: None,
        }
    }

    /// Bound the wall-clock time of each [`download_all`](Self::download_all)
    /// batch. Files not started before the deadline are reported as failed.
    /// A timeout too large to represent as a deadline leaves the batch unbounded.
    pub fn with_batch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.batch_timeout = timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn protocol(&self) -> &str {
        self.channel.protocol()
    }

    /// Connect and establish the file-transfer session.
    ///
    /// An existing connection is released first. On failure the transport
    /// is left `Disconnected`.
    pub fn connect(&mut self, params: &ConnectParams) -> Result<(), ConnectionError> {
        if matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::SessionEstablished
        ) {
            self.disconnect();
        }

        let target = params.target();
        info!("Connecting to {} ({})", target, self.channel.protocol());
        if let Err(e) = self.channel.connect(params) {
            error!("{}", e);
            self.channel.close_connection();
            self.state = ConnectionState::Disconnected;
            return Err(e);
        }
        self.state = ConnectionState::Connected;
        info!("Connected successfully");

        info!("Setting up file-transfer session");
        if let Err(e) = self.channel.open_file_session(params) {
            error!("{}", e);
            self.channel.close_file_session();
            self.channel.close_connection();
            self.state = ConnectionState::Disconnected;
            return Err(e);
        }
        self.state = ConnectionState::SessionEstablished;
        info!("File-transfer session established");
        Ok(())
    }

    /// Names in `remote_dir` matching `pattern`, sorted lexicographically.
    ///
    /// An empty directory, or one with no matching names, yields an empty
    /// list.
    pub fn list(
        &mut self,
        remote_dir: &str,
        pattern: &NamePattern,
    ) -> Result<Vec<String>, TransferError> {
        let (_, names) = self.list_resolved(remote_dir, pattern)?;
        Ok(names)
    }

    fn list_resolved(
        &mut self,
        remote_dir: &str,
        pattern: &NamePattern,
    ) -> Result<(String, Vec<String>), TransferError> {
        self.require_session()?;

        let listing_error = |source| TransferError::Listing {
            dir: remote_dir.to_string(),
            source,
        };
        let resolved = self.channel.resolve_dir(remote_dir).map_err(listing_error)?;
        let all = self.channel.list_dir(&resolved).map_err(listing_error)?;
        info!("All files: {:?}", all);

        let mut names = pattern.select(all);
        names.sort();
        info!("Log files: {:?}", names);
        Ok((resolved, names))
    }

    /// Download every file in `remote_dir` matching `pattern` into
    /// `local_dir`.
    ///
    /// Listing happens eagerly; transfers happen one at a time as the
    /// returned iterator is advanced.
    pub fn download_all(
        &mut self,
        remote_dir: &str,
        local_dir: &Path,
        pattern: &NamePattern,
    ) -> Result<Downloads<'_>, TransferError> {
        info!("Download files");
        info!("Source: {}", remote_dir);
        info!("Destination: {}", local_dir.display());
        info!("Mask: {}", pattern);

        let (resolved, names) = self.list_resolved(remote_dir, pattern)?;
        let deadline = self
            .batch_timeout
            .and_then(|t| Instant::now().checked_add(t));

        Ok(Downloads {
            channel: &mut self.channel,
            remote_dir: resolved,
            local_dir: local_dir.to_path_buf(),
            pending: names.into_iter(),
            deadline,
        })
    }

    /// Close the file-transfer session, then the connection.
    ///
    /// Safe to call repeatedly and after a failed connect.
    pub fn disconnect(&mut self) {
        match self.state {
            ConnectionState::SessionEstablished => {
                self.channel.close_file_session();
                info!("File-transfer session closed");
                self.channel.close_connection();
                info!("Connection to server closed");
                self.state = ConnectionState::Closed;
            }
            ConnectionState::Connected => {
                self.channel.close_connection();
                info!("Connection to server closed");
                self.state = ConnectionState::Closed;
            }
            ConnectionState::Disconnected | ConnectionState::Closed => {}
        }
    }

    fn require_session(&self) -> Result<(), TransferError> {
        if self.state == ConnectionState::SessionEstablished {
            Ok(())
        } else {
            Err(TransferError::NotConnected)
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Lazy sequence of per-file download results.
///
/// Borrows the transport mutably, so the session cannot be closed while a
/// batch is in progress.
pub struct Downloads<'a> {
    channel: &'a mut Box<dyn SecureChannel>,
    remote_dir: String,
    local_dir: PathBuf,
    pending: std::vec::IntoIter<String>,
    deadline: Option<Instant>,
}

impl Downloads<'_> {
    /// Number of files not yet attempted.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl Iterator for Downloads<'_> {
    type Item = DownloadResult;

    fn next(&mut self) -> Option<DownloadResult> {
        let name = self.pending.next()?;

        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            warn!("Skipped - {} - download deadline exceeded", name);
            return Some(DownloadResult {
                outcome: DownloadOutcome::Failed(TransferError::DeadlineExceeded {
                    name: name.clone(),
                }),
                name,
            });
        }

        let local_path = self.local_dir.join(&name);
        let outcome = match self.channel.fetch(&self.remote_dir, &name, &local_path) {
            Ok(bytes) => {
                info!("OK - {}", name);
                DownloadOutcome::Ok { bytes }
            }
            Err(source) => {
                error!("Failed - {} - {}", name, source);
                // A partial copy must not reach the filter stage.
                let _ = std::fs::remove_file(&local_path);
                DownloadOutcome::Failed(TransferError::Io {
                    name: name.clone(),
                    source,
                })
            }
        };

        if self.pending.as_slice().is_empty() {
            info!("Download completed");
        }
        Some(DownloadResult { name, outcome })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pending.size_hint()
    }
}

impl ExactSizeIterator for Downloads<'_> {}
