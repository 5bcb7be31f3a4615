use std::fs::File;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use ssh2::{CheckResult, ErrorCode, KnownHostFileKind, Session, Sftp};

use super::{HostKeyPolicy, SessionTarget, Transport, TransportError, join_remote};

// libssh2 SFTP status codes
const FX_NO_SUCH_FILE: i32 = 2;
const FX_NO_SUCH_PATH: i32 = 10;

/// SFTP session. SFTP has no server-side working directory, so the cursor
/// lives here as an absolute remote path.
pub struct SftpTransport {
    session: Session,
    sftp: Sftp,
    cwd: String,
}

impl SftpTransport {
    pub fn connect(
        target: &SessionTarget,
        timeout: Duration,
        host_keys: &HostKeyPolicy,
    ) -> Result<Self, TransportError> {
        let addr = target
            .address()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("could not resolve {}", target.address()),
                ))
            })?;
        let tcp = TcpStream::connect_timeout(&addr, timeout)?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
        session.handshake()?;

        match host_keys {
            HostKeyPolicy::KnownHosts(path) => verify_host_key(&session, target, path)?,
            HostKeyPolicy::InsecureAcceptAny => {}
        }

        let auth_failed = || TransportError::Authentication {
            user: target.username.clone(),
            host: target.host.clone(),
        };
        session
            .userauth_password(&target.username, &target.password)
            .map_err(|_| auth_failed())?;
        if !session.authenticated() {
            return Err(auth_failed());
        }

        // The grace period only covers connection setup.
        session.set_timeout(0);

        let sftp = session.sftp()?;
        let cwd = sftp.realpath(Path::new("."))?.to_string_lossy().into_owned();
        Ok(Self { session, sftp, cwd })
    }
}

fn verify_host_key(
    session: &Session,
    target: &SessionTarget,
    known_hosts: &Path,
) -> Result<(), TransportError> {
    let reject = |reason: String| TransportError::HostKey {
        host: target.host.clone(),
        reason,
    };

    let mut known = session.known_hosts()?;
    known
        .read_file(known_hosts, KnownHostFileKind::OpenSSH)
        .map_err(|err| reject(format!("cannot read {}: {err}", known_hosts.display())))?;
    let (key, _) = session
        .host_key()
        .ok_or_else(|| reject("server did not present a host key".to_string()))?;

    match known.check_port(&target.host, target.port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => Err(reject(format!(
            "host is not listed in {}",
            known_hosts.display()
        ))),
        CheckResult::Mismatch => Err(reject("host key does not match known_hosts".to_string())),
        CheckResult::Failure => Err(reject("known_hosts lookup failed".to_string())),
    }
}

fn stat_error(target: String, err: ssh2::Error) -> TransportError {
    match err.code() {
        ErrorCode::SFTP(FX_NO_SUCH_FILE | FX_NO_SUCH_PATH) => {
            TransportError::DirectoryNotFound(target)
        }
        _ => TransportError::Ssh(err),
    }
}

impl Transport for SftpTransport {
    fn change_directory(&mut self, name: &str) -> Result<(), TransportError> {
        let target = join_remote(&self.cwd, name);
        match self.sftp.stat(Path::new(&target)) {
            Ok(stat) if stat.is_dir() => {
                self.cwd = target;
                Ok(())
            }
            Ok(_) => Err(TransportError::Io(std::io::Error::other(format!(
                "{target} exists but is not a directory"
            )))),
            Err(err) => Err(stat_error(target, err)),
        }
    }

    fn create_directory(&mut self, name: &str) -> Result<(), TransportError> {
        let target = join_remote(&self.cwd, name);
        self.sftp.mkdir(Path::new(&target), 0o755)?;
        Ok(())
    }

    fn upload_file(&mut self, local: &Path, remote_name: &str) -> Result<(), TransportError> {
        let target = join_remote(&self.cwd, remote_name);
        let mut source = File::open(local)?;
        let mut remote = self.sftp.create(Path::new(&target))?;
        let bytes = std::io::copy(&mut source, &mut remote)?;
        tracing::debug!(file = %local.display(), remote = %target, bytes, "stored");
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), TransportError> {
        let SftpTransport { session, sftp, .. } = *self;
        drop(sftp);
        session.disconnect(None, "publish finished", None)?;
        Ok(())
    }
}
