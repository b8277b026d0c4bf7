//! SFTP channel over SSH with password authentication.
//!
//! # Host keys
//!
//! The server key is checked against an OpenSSH `known_hosts` file
//! (`remote.known_hosts`, else `~/.ssh/known_hosts`):
//!
//! | Check result     | `strict_host_key = false` | `strict_host_key = true` |
//! |------------------|---------------------------|--------------------------|
//! | match            | accept                    | accept                   |
//! | unknown host     | accept, warn              | `BadHostKey`             |
//! | key mismatch     | `BadHostKey`              | `BadHostKey`             |
//!
//! Unknown hosts are never written back to the file.
//!
//! # Timeouts
//!
//! The TCP connect is bounded by `connect_timeout`; every blocking SSH call
//! after that by `io_timeout` (zero disables it).

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};

use ssh2::{CheckResult, KnownHostFileKind, Session, Sftp};
use tracing::{debug, warn};

use crate::error::{ConnectionError, ConnectionErrorKind};
use crate::transport::{ConnectParams, SecureChannel};

pub struct SftpChannel {
    known_hosts: Option<PathBuf>,
    strict_host_key: bool,
    session: Option<Session>,
    sftp: Option<Sftp>,
}

impl SftpChannel {
    pub fn new(known_hosts: Option<PathBuf>, strict_host_key: bool) -> Self {
        Self {
            known_hosts,
            strict_host_key,
            session: None,
            sftp: None,
        }
    }

    fn known_hosts_path(&self) -> Option<PathBuf> {
        self.known_hosts
            .clone()
            .or_else(|| dirs::home_dir().map(|h| h.join(".ssh").join("known_hosts")))
    }

    fn verify_host_key(
        &self,
        session: &Session,
        params: &ConnectParams,
    ) -> Result<(), ConnectionError> {
        let bad_key = |message: String| {
            ConnectionError::new(ConnectionErrorKind::BadHostKey, params.target(), message)
        };

        let (key, _) = session
            .host_key()
            .ok_or_else(|| bad_key("server presented no host key".to_string()))?;

        let mut known = session
            .known_hosts()
            .map_err(|e| bad_key(format!("cannot initialise known hosts: {e}")))?;
        if let Some(path) = self.known_hosts_path() {
            if let Err(e) = known.read_file(&path, KnownHostFileKind::OpenSSH) {
                if self.strict_host_key {
                    return Err(bad_key(format!("cannot read {}: {e}", path.display())));
                }
                debug!("known_hosts {} not loaded: {}", path.display(), e);
            }
        }

        match known.check_port(&params.host, params.port, key) {
            CheckResult::Match => Ok(()),
            CheckResult::NotFound if !self.strict_host_key => {
                warn!("Host {} is not in known_hosts; accepting its key", params.host);
                Ok(())
            }
            CheckResult::NotFound => Err(bad_key("host is not in known_hosts".to_string())),
            CheckResult::Mismatch => Err(bad_key("host key does not match known_hosts".to_string())),
            CheckResult::Failure => Err(bad_key("host key check failed".to_string())),
        }
    }

    fn sftp(&self) -> io::Result<&Sftp> {
        self.sftp.as_ref().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "SFTP session is not open")
        })
    }
}

impl SecureChannel for SftpChannel {
    fn protocol(&self) -> &str {
        "sftp"
    }

    fn connect(&mut self, params: &ConnectParams) -> Result<(), ConnectionError> {
        let network = |message: String| {
            ConnectionError::new(ConnectionErrorKind::NetworkFailure, params.target(), message)
        };

        let addr = (params.host.as_str(), params.port)
            .to_socket_addrs()
            .map_err(|e| network(format!("cannot resolve {}: {e}", params.host)))?
            .next()
            .ok_or_else(|| network(format!("no address for {}", params.host)))?;
        let tcp = TcpStream::connect_timeout(&addr, params.connect_timeout)
            .map_err(|e| network(e.to_string()))?;

        let mut session = Session::new().map_err(|e| network(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(u32::try_from(params.io_timeout.as_millis()).unwrap_or(u32::MAX));
        session
            .handshake()
            .map_err(|e| network(format!("SSH handshake failed: {e}")))?;

        self.verify_host_key(&session, params)?;

        session
            .userauth_password(&params.user, &params.password)
            .map_err(|e| {
                ConnectionError::new(ConnectionErrorKind::AuthFailure, params.target(), e)
            })?;
        if !session.authenticated() {
            return Err(ConnectionError::new(
                ConnectionErrorKind::AuthFailure,
                params.target(),
                "server did not accept the credentials",
            ));
        }

        self.session = Some(session);
        Ok(())
    }

    fn open_file_session(&mut self, params: &ConnectParams) -> Result<(), ConnectionError> {
        let session = self.session.as_ref().ok_or_else(|| {
            ConnectionError::new(
                ConnectionErrorKind::SessionFailure,
                params.target(),
                "not connected",
            )
        })?;
        let sftp = session.sftp().map_err(|e| {
            ConnectionError::new(ConnectionErrorKind::SessionFailure, params.target(), e)
        })?;
        self.sftp = Some(sftp);
        Ok(())
    }

    fn resolve_dir(&mut self, dir: &str) -> io::Result<String> {
        let dir = if dir.is_empty() { "." } else { dir };
        let resolved = self.sftp()?.realpath(Path::new(dir))?;
        Ok(resolved.to_string_lossy().to_string())
    }

    fn list_dir(&mut self, dir: &str) -> io::Result<Vec<String>> {
        let entries = self.sftp()?.readdir(Path::new(dir))?;
        Ok(entries
            .into_iter()
            .filter(|(_, stat)| stat.is_file())
            .filter_map(|(path, _)| path.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect())
    }

    fn fetch(&mut self, dir: &str, name: &str, local_path: &Path) -> io::Result<u64> {
        let remote_path = Path::new(dir).join(name);
        let mut remote = self.sftp()?.open(&remote_path)?;
        let mut local = std::fs::File::create(local_path)?;
        io::copy(&mut remote, &mut local)
    }

    fn close_file_session(&mut self) {
        // Dropping the handle closes the SFTP channel.
        self.sftp.take();
    }

    fn close_connection(&mut self) {
        self.sftp.take();
        if let Some(session) = self.session.take() {
            if let Err(e) = session.disconnect(None, "harvest complete", None) {
                debug!("SSH disconnect: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ConnectionState, Transport};
    use std::net::TcpListener;
    use std::time::Duration;

    fn params(port: u16) -> ConnectParams {
        ConnectParams {
            host: "127.0.0.1".to_string(),
            port,
            user: "reaper".to_string(),
            password: "secret".to_string(),
            connect_timeout: Duration::from_secs(2),
            io_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn refused_connection_is_a_network_failure() {
        // Bind then drop to obtain a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut transport = Transport::new(Box::new(SftpChannel::new(None, false)));
        let err = transport.connect(&params(port)).unwrap_err();
        assert_eq!(err.kind, ConnectionErrorKind::NetworkFailure);
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn non_ssh_peer_fails_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                use std::io::Write;
                let _ = stream.write_all(b"HTTP/1.0 400 Bad Request\r\n\r\n");
            }
        });

        let mut channel = SftpChannel::new(None, false);
        let err = channel.connect(&params(port)).unwrap_err();
        assert_eq!(err.kind, ConnectionErrorKind::NetworkFailure);
        channel.close_connection();
        server.join().unwrap();
    }

    #[test]
    fn file_operations_need_a_session() {
        let mut channel = SftpChannel::new(None, true);
        assert_eq!(
            channel.list_dir("/").unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
        let err = channel.open_file_session(&params(22)).unwrap_err();
        assert_eq!(err.kind, ConnectionErrorKind::SessionFailure);
        // Closing parts that were never opened is harmless.
        channel.close_file_session();
        channel.close_connection();
    }
}
