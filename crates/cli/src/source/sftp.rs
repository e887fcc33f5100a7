//! `CSV_LOCATION: FTP` — file drop served over SFTP (libssh2).
//!
//! Env: `FTP_HOST`, `FTP_USERNAME`, `FTP_PASSWORD`, optional `FTP_PORT`
//! (default 22) and `FTP_KNOWN_HOSTS`. When a known_hosts file is given the
//! server key must match an entry in it; otherwise the presented key is
//! logged and accepted.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ssh2::{CheckResult, KnownHostFileKind, Session};

use apptopo_recon::{CsvSource, SourceError};

use super::require;

const DEFAULT_PORT: u16 = 22;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// libssh2 `LIBSSH2_FX_NO_SUCH_FILE`.
const FX_NO_SUCH_FILE: std::os::raw::c_int = 2;

pub struct SftpSource {
    host: String,
    port: u16,
    username: String,
    password: String,
    known_hosts: Option<PathBuf>,
    dir: PathBuf,
}

impl SftpSource {
    pub fn from_lookup(
        lookup: &impl Fn(&str) -> Option<String>,
        dir: &str,
    ) -> Result<Self, String> {
        let host = require(lookup, "FTP_HOST")?;
        let username = require(lookup, "FTP_USERNAME")?;
        let password = require(lookup, "FTP_PASSWORD")?;

        let port = match lookup("FTP_PORT").map(|p| p.trim().to_string()) {
            Some(p) if !p.is_empty() => p
                .parse::<u16>()
                .map_err(|_| format!("FTP_PORT must be a port number, got {p:?}"))?,
            _ => DEFAULT_PORT,
        };

        let known_hosts = lookup("FTP_KNOWN_HOSTS")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            host,
            port,
            username,
            password,
            known_hosts,
            dir: PathBuf::from(dir),
        })
    }

    fn connect(&self) -> Result<Session, SourceError> {
        let unavailable = |what: &str, e: &dyn std::fmt::Display| {
            SourceError::Unavailable(format!("{}:{}: {what}: {e}", self.host, self.port))
        };

        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| unavailable("resolve", &e))?
            .next()
            .ok_or_else(|| SourceError::Unavailable(format!("{}: no address", self.host)))?;

        let tcp = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .map_err(|e| unavailable("connect", &e))?;

        let mut session = Session::new().map_err(|e| unavailable("session", &e))?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| unavailable("handshake", &e))?;

        self.verify_host_key(&session)?;

        session
            .userauth_password(&self.username, &self.password)
            .map_err(|e| unavailable(&format!("authentication as {}", self.username), &e))?;

        Ok(session)
    }

    fn verify_host_key(&self, session: &Session) -> Result<(), SourceError> {
        let (key, key_type) = session.host_key().ok_or_else(|| {
            SourceError::Unavailable(format!("{}: server did not present a host key", self.host))
        })?;
        let fingerprint = fingerprint(key);

        let Some(path) = &self.known_hosts else {
            tracing::warn!(
                host = %self.host,
                key_type = ?key_type,
                fingerprint = %fingerprint,
                "FTP_KNOWN_HOSTS not set, accepting host key unverified"
            );
            return Ok(());
        };

        let mut known = session.known_hosts().map_err(|e| {
            SourceError::Unavailable(format!("cannot initialise known_hosts: {e}"))
        })?;
        known
            .read_file(path, KnownHostFileKind::OpenSSH)
            .map_err(|e| SourceError::Unavailable(format!("cannot read {}: {e}", path.display())))?;

        match known.check_port(&self.host, self.port, key) {
            CheckResult::Match => Ok(()),
            CheckResult::NotFound => Err(SourceError::Unavailable(format!(
                "host key for {}:{} not found in {} (presented {fingerprint})",
                self.host,
                self.port,
                path.display()
            ))),
            CheckResult::Mismatch => Err(SourceError::Unavailable(format!(
                "HOST KEY MISMATCH for {}:{} against {} (presented {fingerprint})",
                self.host,
                self.port,
                path.display()
            ))),
            CheckResult::Failure => Err(SourceError::Unavailable(format!(
                "host key check failed for {}:{}",
                self.host, self.port
            ))),
        }
    }
}

impl CsvSource for SftpSource {
    fn fetch_bytes(&self, filename: &str) -> Result<Vec<u8>, SourceError> {
        let remote = self.dir.join(filename);
        let what = format!("sftp://{}{}", self.host, display_remote(&remote));

        let session = self.connect()?;
        let sftp = session
            .sftp()
            .map_err(|e| SourceError::Unavailable(format!("{what}: open SFTP channel: {e}")))?;

        let mut file = sftp.open(&remote).map_err(|e| match e.code() {
            ssh2::ErrorCode::SFTP(FX_NO_SUCH_FILE) => SourceError::NotFound(what.clone()),
            _ => SourceError::Unavailable(format!("{what}: {e}")),
        })?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| SourceError::Unavailable(format!("{what}: {e}")))?;
        Ok(bytes)
    }

    fn describe(&self) -> String {
        format!(
            "SFTP {}@{}:{} {}",
            self.username,
            self.host,
            self.port,
            display_remote(&self.dir)
        )
    }
}

fn fingerprint(key: &[u8]) -> String {
    use sha2::Digest;
    format!("SHA256:{:x}", sha2::Sha256::digest(key))
}

fn display_remote(path: &Path) -> String {
    let s = path.display().to_string();
    if s.starts_with('/') {
        s
    } else {
        format!("/{s}")
    }
}
