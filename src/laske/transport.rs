//! File transfer to and from Laske.
//!
//! Export files are uploaded to the export server; payment files are listed,
//! downloaded and then moved into the remote `arch/` directory.

use std::fs;
use std::path::{Path, PathBuf};

use super::settings::{Protocol, ServerSettings};
use crate::core::BillingError;

/// Name of the archive directory processed files are moved into.
pub const ARCHIVE_DIR: &str = "arch";

pub trait Transport {
    /// Upload the local file `local` as `remote_name`.
    fn upload(&mut self, local: &Path, remote_name: &str) -> Result<(), BillingError>;

    /// File names in the remote directory.
    fn list(&mut self) -> Result<Vec<String>, BillingError>;

    fn download(&mut self, name: &str) -> Result<Vec<u8>, BillingError>;

    /// Move `name` into the archive directory.
    fn archive(&mut self, name: &str) -> Result<(), BillingError>;
}

fn transport_io(context: &str, e: std::io::Error) -> BillingError {
    BillingError::Transport(format!("{context}: {e}"))
}

/// A local directory standing in for the remote server.
#[derive(Debug, Clone)]
pub struct LocalDirTransport {
    dir: PathBuf,
}

impl LocalDirTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Transport for LocalDirTransport {
    fn upload(&mut self, local: &Path, remote_name: &str) -> Result<(), BillingError> {
        fs::copy(local, self.dir.join(remote_name))
            .map_err(|e| transport_io(&format!("upload {remote_name}"), e))?;
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<String>, BillingError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| transport_io("list", e))? {
            let entry = entry.map_err(|e| transport_io("list", e))?;
            if entry.file_type().map_err(|e| transport_io("list", e))?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn download(&mut self, name: &str) -> Result<Vec<u8>, BillingError> {
        fs::read(self.dir.join(name)).map_err(|e| transport_io(&format!("download {name}"), e))
    }

    fn archive(&mut self, name: &str) -> Result<(), BillingError> {
        let archive = self.dir.join(ARCHIVE_DIR);
        fs::create_dir_all(&archive).map_err(|e| transport_io("archive", e))?;
        fs::rename(self.dir.join(name), archive.join(name))
            .map_err(|e| transport_io(&format!("archive {name}"), e))
    }
}

/// Open the transport `server` asks for. Protocols left out of the build
/// are a configuration error.
pub fn connect(server: &ServerSettings) -> Result<Box<dyn Transport>, BillingError> {
    match server.protocol {
        Protocol::Local => Ok(Box::new(LocalDirTransport::new(&server.directory))),
        #[cfg(feature = "sftp")]
        Protocol::Sftp => Ok(Box::new(super::sftp::SftpTransport::connect(server)?)),
        #[cfg(feature = "ftp")]
        Protocol::Ftp => Ok(Box::new(super::ftp::FtpTransport::connect(server)?)),
        #[allow(unreachable_patterns)]
        protocol => Err(BillingError::Config(format!(
            "{protocol:?} transport is not enabled in this build"
        ))),
    }
}
