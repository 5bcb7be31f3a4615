use std::fs::File;
use std::net::ToSocketAddrs;
use std::path::Path;
use std::time::Duration;

use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};

use super::{SessionTarget, Transport, TransportError};

/// Plain FTP session. The server keeps the working directory.
pub struct FtpTransport {
    stream: FtpStream,
}

impl FtpTransport {
    pub fn connect(target: &SessionTarget, timeout: Duration) -> Result<Self, TransportError> {
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
        let mut stream = FtpStream::connect_timeout(addr, timeout)?;
        stream
            .login(&target.username, &target.password)
            .map_err(|err| match err {
                FtpError::UnexpectedResponse(_) => TransportError::Authentication {
                    user: target.username.clone(),
                    host: target.host.clone(),
                },
                other => TransportError::Ftp(other),
            })?;
        stream.transfer_type(FileType::Binary)?;
        Ok(Self { stream })
    }
}

/// FTP has no dedicated "no such directory" reply; servers answer a failed
/// CWD with some permanent negative completion (5xx), usually 550.
fn cwd_error(name: &str, err: FtpError) -> TransportError {
    match err {
        FtpError::UnexpectedResponse(ref response)
            if (500..600).contains(&response.status.code()) =>
        {
            TransportError::DirectoryNotFound(name.to_string())
        }
        other => TransportError::Ftp(other),
    }
}

impl Transport for FtpTransport {
    fn change_directory(&mut self, name: &str) -> Result<(), TransportError> {
        self.stream.cwd(name).map_err(|err| cwd_error(name, err))
    }

    fn create_directory(&mut self, name: &str) -> Result<(), TransportError> {
        self.stream.mkdir(name)?;
        Ok(())
    }

    fn upload_file(&mut self, local: &Path, remote_name: &str) -> Result<(), TransportError> {
        let mut file = File::open(local)?;
        let bytes = self.stream.put_file(remote_name, &mut file)?;
        tracing::debug!(file = %local.display(), bytes, "stored");
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), TransportError> {
        self.stream.quit()?;
        Ok(())
    }
}
