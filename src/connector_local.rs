//! Directory-backed channel.
//!
//! Serves files from a local directory through the same
//! [`SecureChannel`] contract as the SFTP connector. Useful for
//! reconstructing logs collected by other means (a mounted share, a
//! copied tarball) and for exercising the whole pipeline without a server.
//!
//! Remote directories are resolved relative to `root`; the empty directory
//! is `root` itself. Absolute remote paths are taken as is.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{ConnectionError, ConnectionErrorKind};
use crate::transport::{ConnectParams, SecureChannel};

#[derive(Debug)]
pub struct LocalChannel {
    root: PathBuf,
    connected: bool,
    session: bool,
}

impl LocalChannel {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            connected: false,
            session: false,
        }
    }

    fn resolve(&self, dir: &str) -> PathBuf {
        if dir.is_empty() {
            self.root.clone()
        } else {
            self.root.join(dir)
        }
    }

    fn require_session(&self) -> io::Result<()> {
        if self.session {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "file-transfer session is not open",
            ))
        }
    }
}

impl SecureChannel for LocalChannel {
    fn protocol(&self) -> &str {
        "local"
    }

    fn connect(&mut self, params: &ConnectParams) -> Result<(), ConnectionError> {
        if !self.root.is_dir() {
            return Err(ConnectionError::new(
                ConnectionErrorKind::NetworkFailure,
                params.target(),
                format!("root does not exist: {}", self.root.display()),
            ));
        }
        self.connected = true;
        Ok(())
    }

    fn open_file_session(&mut self, params: &ConnectParams) -> Result<(), ConnectionError> {
        if !self.connected {
            return Err(ConnectionError::new(
                ConnectionErrorKind::SessionFailure,
                params.target(),
                "not connected",
            ));
        }
        self.session = true;
        Ok(())
    }

    fn resolve_dir(&mut self, dir: &str) -> io::Result<String> {
        self.require_session()?;
        let path = self.resolve(dir);
        Ok(fs::canonicalize(&path)?.to_string_lossy().to_string())
    }

    fn list_dir(&mut self, dir: &str) -> io::Result<Vec<String>> {
        self.require_session()?;
        let mut names = Vec::new();
        for entry in WalkDir::new(self.resolve(dir)).min_depth(1).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        Ok(names)
    }

    fn fetch(&mut self, dir: &str, name: &str, local_path: &Path) -> io::Result<u64> {
        self.require_session()?;
        fs::copy(self.resolve(dir).join(name), local_path)
    }

    fn close_file_session(&mut self) {
        self.session = false;
    }

    fn close_connection(&mut self) {
        self.session = false;
        self.connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DownloadOutcome;
    use crate::sources::NamePattern;
    use crate::transport::{ConnectionState, Transport};
    use std::time::Duration;
    use tempfile::TempDir;

    fn params() -> ConnectParams {
        ConnectParams {
            host: "localhost".to_string(),
            port: 0,
            user: "reaper".to_string(),
            password: String::new(),
            connect_timeout: Duration::from_secs(1),
            io_timeout: Duration::ZERO,
        }
    }

    #[test]
    fn missing_root_is_a_network_failure() {
        let tmp = TempDir::new().unwrap();
        let mut transport = Transport::new(Box::new(LocalChannel::new(tmp.path().join("gone"))));
        let err = transport.connect(&params()).unwrap_err();
        assert_eq!(err.kind, ConnectionErrorKind::NetworkFailure);
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn lists_regular_files_only() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("A.log"), "a\n").unwrap();
        fs::write(tmp.path().join("notes.txt"), "n\n").unwrap();
        fs::create_dir(tmp.path().join("nested.log")).unwrap();

        let mut transport = Transport::new(Box::new(LocalChannel::new(tmp.path())));
        transport.connect(&params()).unwrap();
        let names = transport.list("", &NamePattern::default()).unwrap();
        assert_eq!(names, vec!["A.log"]);
    }

    #[test]
    fn downloads_into_local_dir() {
        let remote = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        fs::create_dir(remote.path().join("app")).unwrap();
        fs::write(remote.path().join("app").join("B.log"), "hello\n").unwrap();

        let mut transport = Transport::new(Box::new(LocalChannel::new(remote.path())));
        transport.connect(&params()).unwrap();
        let results: Vec<_> = transport
            .download_all("app", local.path(), &NamePattern::default())
            .unwrap()
            .collect();

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].outcome, DownloadOutcome::Ok { bytes: 6 }));
        assert_eq!(
            fs::read_to_string(local.path().join("B.log")).unwrap(),
            "hello\n"
        );
    }

    #[test]
    fn operations_require_open_session() {
        let tmp = TempDir::new().unwrap();
        let mut channel = LocalChannel::new(tmp.path());
        assert!(channel.list_dir("").is_err());
        channel.connect(&params()).unwrap();
        channel.open_file_session(&params()).unwrap();
        assert!(channel.list_dir("").is_ok());
        channel.close_file_session();
        assert!(channel.list_dir("").is_err());
    }
}
