//! SFTP transport over `ssh2`.
//!
//! The server must present the host key configured for the direction;
//! authentication is by password.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ssh2::{HostKeyType, Session, Sftp};

use super::settings::ServerSettings;
use super::transport::{ARCHIVE_DIR, Transport};
use crate::core::BillingError;

fn ssh_err(context: &str, e: impl std::fmt::Display) -> BillingError {
    BillingError::Transport(format!("{context}: {e}"))
}

fn key_type_matches(configured: &str, actual: HostKeyType) -> bool {
    match configured {
        "ssh-ed25519" => matches!(actual, HostKeyType::Ed25519),
        "ssh-rsa" | "rsa" => matches!(actual, HostKeyType::Rsa),
        t if t.starts_with("ecdsa-") => matches!(
            actual,
            HostKeyType::Ecdsa256 | HostKeyType::Ecdsa384 | HostKeyType::Ecdsa521
        ),
        _ => false,
    }
}

/// Compare the server's host key with the configured one.
fn verify_host_key(session: &Session, settings: &ServerSettings) -> Result<(), BillingError> {
    let (Some(key_type), Some(key)) = (settings.key_type.as_deref(), settings.key.as_deref()) else {
        return Err(BillingError::Transport(format!(
            "no host key configured for {}",
            settings.host
        )));
    };
    let expected = STANDARD
        .decode(key.trim())
        .map_err(|e| {
            BillingError::Config(format!("host key of {} is not base64: {e}", settings.host))
        })?;
    let (actual, actual_type) = session
        .host_key()
        .ok_or_else(|| {
            BillingError::Transport(format!("{} presented no host key", settings.host))
        })?;
    if !key_type_matches(key_type, actual_type) || actual != expected.as_slice() {
        return Err(BillingError::Transport(format!("host key mismatch for {}", settings.host)));
    }
    Ok(())
}

pub struct SftpTransport {
    // Keeps the connection alive for `sftp`.
    _session: Session,
    sftp: Sftp,
    directory: PathBuf,
}

impl SftpTransport {
    pub fn connect(settings: &ServerSettings) -> Result<Self, BillingError> {
        let tcp = TcpStream::connect((settings.host.as_str(), settings.port))
            .map_err(|e| ssh_err(&format!("connect {}:{}", settings.host, settings.port), e))?;
        let mut session = Session::new().map_err(|e| ssh_err("session", e))?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| ssh_err("handshake", e))?;
        verify_host_key(&session, settings)?;

        let password = settings.password.as_deref().unwrap_or_default();
        session
            .userauth_password(&settings.username, password)
            .map_err(|e| ssh_err("authentication", e))?;
        let sftp = session.sftp().map_err(|e| ssh_err("sftp", e))?;
        tracing::debug!(host = %settings.host, directory = %settings.directory, "SFTP connected");

        Ok(Self {
            _session: session,
            sftp,
            directory: PathBuf::from(&settings.directory),
        })
    }

    fn remote(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }
}

impl Transport for SftpTransport {
    fn upload(&mut self, local: &Path, remote_name: &str) -> Result<(), BillingError> {
        let content =
            std::fs::read(local).map_err(|e| ssh_err(&format!("read {}", local.display()), e))?;
        let mut file = self
            .sftp
            .create(&self.remote(remote_name))
            .map_err(|e| ssh_err(&format!("create {remote_name}"), e))?;
        file.write_all(&content)
            .map_err(|e| ssh_err(&format!("write {remote_name}"), e))?;
        tracing::info!(file = remote_name, bytes = content.len(), "uploaded");
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<String>, BillingError> {
        let entries = self
            .sftp
            .readdir(&self.directory)
            .map_err(|e| ssh_err("list", e))?;
        let mut names: Vec<String> = entries
            .into_iter()
            .filter(|(_, stat)| stat.is_file())
            .filter_map(|(path, _)| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Ok(names)
    }

    fn download(&mut self, name: &str) -> Result<Vec<u8>, BillingError> {
        let mut file = self
            .sftp
            .open(&self.remote(name))
            .map_err(|e| ssh_err(&format!("open {name}"), e))?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| ssh_err(&format!("download {name}"), e))?;
        Ok(content)
    }

    fn archive(&mut self, name: &str) -> Result<(), BillingError> {
        let archive = self.directory.join(ARCHIVE_DIR);
        if self.sftp.stat(&archive).is_err() {
            self.sftp
                .mkdir(&archive, 0o755)
                .map_err(|e| ssh_err("create archive directory", e))?;
        }
        self.sftp
            .rename(&self.remote(name), &archive.join(name), None)
            .map_err(|e| ssh_err(&format!("archive {name}"), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_types() {
        assert!(key_type_matches("ssh-ed25519", HostKeyType::Ed25519));
        assert!(key_type_matches("ecdsa-sha2-nistp256", HostKeyType::Ecdsa256));
        assert!(key_type_matches("ssh-rsa", HostKeyType::Rsa));
        assert!(!key_type_matches("ssh-rsa", HostKeyType::Ed25519));
        assert!(!key_type_matches("ssh-dss", HostKeyType::Dss));
    }
}
