//! Plain FTP transport over `suppaftp`. Files are fetched with `RETR` and
//! archived with `RENAME` into `arch/`.

use std::fs::File;
use std::path::Path;

use suppaftp::FtpStream;

use super::settings::ServerSettings;
use super::transport::{ARCHIVE_DIR, Transport};
use crate::core::BillingError;

fn ftp_err(context: &str, e: impl std::fmt::Display) -> BillingError {
    BillingError::Transport(format!("{context}: {e}"))
}

pub struct FtpTransport {
    stream: FtpStream,
}

impl FtpTransport {
    pub fn connect(settings: &ServerSettings) -> Result<Self, BillingError> {
        let address = format!("{}:{}", settings.host, settings.port);
        let mut stream = FtpStream::connect(&address)
            .map_err(|e| ftp_err(&format!("connect {address}"), e))?;
        stream
            .login(settings.username.as_str(), settings.password.as_deref().unwrap_or_default())
            .map_err(|e| ftp_err("login", e))?;
        if !settings.directory.is_empty() {
            stream
                .cwd(&settings.directory)
                .map_err(|e| ftp_err(&format!("cwd {}", settings.directory), e))?;
        }
        tracing::debug!(host = %settings.host, "FTP connected");
        Ok(Self { stream })
    }
}

impl Drop for FtpTransport {
    fn drop(&mut self) {
        let _ = self.stream.quit();
    }
}

impl Transport for FtpTransport {
    fn upload(&mut self, local: &Path, remote_name: &str) -> Result<(), BillingError> {
        let mut file =
            File::open(local).map_err(|e| ftp_err(&format!("open {}", local.display()), e))?;
        let bytes = self
            .stream
            .put_file(remote_name, &mut file)
            .map_err(|e| ftp_err(&format!("upload {remote_name}"), e))?;
        tracing::info!(file = remote_name, bytes, "uploaded");
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<String>, BillingError> {
        let mut names: Vec<String> = self
            .stream
            .nlst(None)
            .map_err(|e| ftp_err("list", e))?
            .into_iter()
            .filter_map(|entry| entry.rsplit('/').next().map(str::to_string))
            .filter(|name| !name.is_empty() && name != ARCHIVE_DIR)
            .collect();
        names.sort();
        Ok(names)
    }

    fn download(&mut self, name: &str) -> Result<Vec<u8>, BillingError> {
        let buffer = self
            .stream
            .retr_as_buffer(name)
            .map_err(|e| ftp_err(&format!("download {name}"), e))?;
        Ok(buffer.into_inner())
    }

    fn archive(&mut self, name: &str) -> Result<(), BillingError> {
        self.stream
            .rename(name, &format!("{ARCHIVE_DIR}/{name}"))
            .map_err(|e| ftp_err(&format!("archive {name}"), e))
    }
}
