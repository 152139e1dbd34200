//! Laske integration settings.
//!
//! Resolved once per job from an optional `laske.{toml,yaml,json}` file and
//! `LASKE_*` environment variables (`__` separates nested keys, e.g.
//! `LASKE_VALUES__SALES_OFFICE`, `LASKE_SERVERS__EXPORT__HOST`).

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::core::BillingError;

/// Constant header values of every exported sales order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LaskeValues {
    pub distribution_channel: String,
    pub division: String,
    pub sales_office: String,
    pub pmntterm: String,
    #[serde(default)]
    pub sales_group: Option<String>,
    #[serde(default)]
    pub order_reason: Option<String>,
}

fn default_port() -> u16 {
    22
}

/// How a server is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    Sftp,
    Ftp,
    /// `directory` is a local path; host and credentials are ignored.
    Local,
}

/// Connection settings of one transfer direction.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// `ssh-ed25519`, `ecdsa-sha2-nistp256` (or another `ecdsa-*`) or `ssh-rsa`.
    #[serde(default)]
    pub key_type: Option<String>,
    /// Base64 host key the server must present.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub directory: String,
}

impl std::fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSettings")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key_type", &self.key_type)
            .field("directory", &self.directory)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LaskeServers {
    #[serde(default)]
    pub export: Option<ServerSettings>,
    #[serde(default)]
    pub payments: Option<ServerSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LaskeSettings {
    /// Local directory export files are written to before upload.
    #[serde(default)]
    pub export_root: Option<PathBuf>,
    /// Days subtracted from the adjusted due date to get `ValueDate`.
    #[serde(default)]
    pub due_date_offset_days: i64,
    /// Identifier in payment file names, `MR_OUT_<id>_...`.
    #[serde(default)]
    pub payments_import_id: Option<String>,
    #[serde(default)]
    pub values: LaskeValues,
    #[serde(default)]
    pub servers: LaskeServers,
}

impl LaskeSettings {
    /// Load settings from `file` (or `laske.*` in the working directory when
    /// present) overlaid with `LASKE_*` environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self, BillingError> {
        let builder = match file {
            Some(path) => Config::builder().add_source(File::from(path)),
            None => Config::builder().add_source(File::with_name("laske").required(false)),
        };
        let config = builder
            .add_source(
                Environment::with_prefix("LASKE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| BillingError::Config(e.to_string()))?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self, BillingError> {
        let settings: Self = config
            .try_deserialize()
            .map_err(|e| BillingError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Header values every export needs.
    pub fn validate(&self) -> Result<(), BillingError> {
        let missing: Vec<&str> = [
            ("values.distribution_channel", &self.values.distribution_channel),
            ("values.division", &self.values.division),
            ("values.sales_office", &self.values.sales_office),
            ("values.pmntterm", &self.values.pmntterm),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(BillingError::Config(format!("missing {}", missing.join(", "))));
        }
        Ok(())
    }

    pub fn export_root(&self) -> Result<&Path, BillingError> {
        self.export_root
            .as_deref()
            .ok_or_else(|| BillingError::Config("export_root is not set".into()))
    }

    pub fn payments_import_id(&self) -> Result<&str, BillingError> {
        self.payments_import_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BillingError::Config("payments_import_id is not set".into()))
    }

    pub fn export_server(&self) -> Result<&ServerSettings, BillingError> {
        self.servers
            .export
            .as_ref()
            .ok_or_else(|| BillingError::Config("servers.export is not set".into()))
    }

    pub fn payments_server(&self) -> Result<&ServerSettings, BillingError> {
        self.servers
            .payments
            .as_ref()
            .ok_or_else(|| BillingError::Config("servers.payments is not set".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const TOML: &str = r#"
export_root = "/var/lib/laske/export"
due_date_offset_days = 3
payments_import_id = "ID340"

[values]
distribution_channel = "10"
division = "10"
sales_office = "2826"
pmntterm = "Z100"

[servers.export]
host = "sftp.example.org"
username = "mvj"
password = "secret"
key_type = "ssh-ed25519"
key = "AAAA"
directory = "/in"
"#;

    #[test]
    fn loads_from_toml() {
        let config = Config::builder()
            .add_source(File::from_str(TOML, FileFormat::Toml))
            .build()
            .unwrap();
        let settings = LaskeSettings::from_config(config).unwrap();
        assert_eq!(settings.due_date_offset_days, 3);
        assert_eq!(settings.values.sales_office, "2826");
        assert_eq!(settings.values.sales_group, None);
        let export = settings.export_server().unwrap();
        assert_eq!(export.protocol, Protocol::Sftp);
        assert_eq!(export.port, 22);
        assert_eq!(export.directory, "/in");
        assert!(settings.payments_server().is_err());
        assert!(!format!("{export:?}").contains("secret"));
    }

    #[test]
    fn missing_values_are_a_config_error() {
        let config = Config::builder()
            .add_source(File::from_str("due_date_offset_days = 1", FileFormat::Toml))
            .build()
            .unwrap();
        let err = LaskeSettings::from_config(config).unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("values.pmntterm"));
    }

    #[test]
    fn protocol_is_selectable() {
        let config = Config::builder()
            .add_source(File::from_str(TOML, FileFormat::Toml))
            .set_override("servers.payments.protocol", "ftp")
            .unwrap()
            .set_override("servers.payments.host", "ftp.example.org")
            .unwrap()
            .set_override("servers.payments.port", 21)
            .unwrap()
            .build()
            .unwrap();
        let settings = LaskeSettings::from_config(config).unwrap();
        let payments = settings.payments_server().unwrap();
        assert_eq!(payments.protocol, Protocol::Ftp);
        assert_eq!(payments.port, 21);
    }

    #[test]
    fn leading_zeros_survive() {
        let config = Config::builder()
            .add_source(File::from_str(TOML, FileFormat::Toml))
            .set_override("values.division", "01")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(LaskeSettings::from_config(config).unwrap().values.division, "01");
    }
}
