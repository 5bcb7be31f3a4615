//! Remote transports: one capability set over FTP and SFTP.

mod ftp;
mod sftp;

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::config::{Config, Protocol};

pub use ftp::FtpTransport;
pub use sftp::SftpTransport;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The requested directory does not exist below the current remote directory.
    #[error("remote directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("host key verification failed for {host}: {reason}")]
    HostKey { host: String, reason: String },

    #[error("authentication failed for {user}@{host}")]
    Authentication { user: String, host: String },

    #[error("ftp: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    #[error("ssh: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub fn is_directory_not_found(&self) -> bool {
        matches!(self, TransportError::DirectoryNotFound(_))
    }
}

/// An open session against the remote host.
///
/// The session owns a remote "current directory". `change_directory` accepts
/// either an absolute path or a single name relative to it.
pub trait Transport {
    fn change_directory(&mut self, name: &str) -> Result<(), TransportError>;

    fn create_directory(&mut self, name: &str) -> Result<(), TransportError>;

    /// Upload `local` into the current remote directory as `remote_name`.
    fn upload_file(&mut self, local: &Path, remote_name: &str) -> Result<(), TransportError>;

    fn close(self: Box<Self>) -> Result<(), TransportError>;
}

/// Connection parameters for one session.
#[derive(Debug, Clone)]
pub struct SessionTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl SessionTarget {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            port: config.effective_port(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Open a session using the transport selected by `config.protocol`.
pub fn build_session(config: &Config) -> Result<Box<dyn Transport>> {
    config.validate_target()?;
    let target = SessionTarget::from_config(config);
    let timeout = Duration::from_secs(config.connect_timeout_secs);
    tracing::debug!(protocol = %config.protocol, address = %target.address(), "opening session");

    let session: Box<dyn Transport> = match config.protocol {
        Protocol::Ftp => Box::new(FtpTransport::connect(&target, timeout)?),
        Protocol::Sftp => {
            let host_keys = if config.insecure_accept_any_host_key {
                tracing::warn!(
                    host = %target.host,
                    "insecure_accept_any_host_key is set; the server identity is NOT verified"
                );
                HostKeyPolicy::InsecureAcceptAny
            } else {
                HostKeyPolicy::KnownHosts(known_hosts_path(config)?)
            };
            Box::new(SftpTransport::connect(&target, timeout, &host_keys)?)
        }
    };
    Ok(session)
}

/// How the SFTP transport decides whether to trust the server.
#[derive(Debug, Clone)]
pub enum HostKeyPolicy {
    KnownHosts(std::path::PathBuf),
    InsecureAcceptAny,
}

fn known_hosts_path(config: &Config) -> Result<std::path::PathBuf> {
    if let Some(path) = &config.known_hosts {
        return Ok(path.clone());
    }
    let home = std::env::var("HOME").map_err(|_| {
        anyhow::anyhow!("HOME not set; configure `known_hosts` for sftp host key checks")
    })?;
    Ok(std::path::PathBuf::from(home).join(".ssh").join("known_hosts"))
}

/// Join a remote directory and a child name with exactly one `/`.
pub(crate) fn join_remote(dir: &str, name: &str) -> String {
    if name.starts_with('/') {
        return name.to_string();
    }
    let dir = dir.trim_end_matches('/');
    format!("{dir}/{name}")
}
