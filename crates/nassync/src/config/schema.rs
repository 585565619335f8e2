use std::path::PathBuf;
use std::time::Duration;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::secrets::{resolve_secret_optional, split_list, SecretError};

/// Top-level configuration for one sync deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub nas: NasSettings,
    pub upload: UploadSettings,
    pub storage: StorageSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Connection settings for the Synology FileStation API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NasSettings {
    /// NAS hostname or IP address.
    pub host: String,

    /// DSM port (default: 5001 for HTTPS).
    #[serde(default = "default_nas_port")]
    pub port: u16,

    /// `http` or `https`.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    pub username: String,

    /// Direct password value. Prefer `passwordEnvVar` or `passwordFile`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env_var: Option<String>,

    /// Shared folder whose sub-folders hold the reports (e.g. `/ESG`).
    pub base_path: String,

    /// Accept self-signed certificates on the NAS.
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Entries requested per FileStation list call.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl NasSettings {
    /// Base URL of the DSM web API, e.g. `https://nas:5001/webapi`.
    pub fn api_base_url(&self) -> String {
        format!("{}://{}:{}/webapi", self.scheme, self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Downstream ingestion API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSettings {
    /// Endpoint accepting the JSON + base64 body.
    pub json_endpoint: String,

    /// Endpoint accepting multipart form data. Defaults to `jsonEndpoint`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_endpoint: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub json_timeout_secs: u64,

    #[serde(default = "default_form_timeout")]
    pub form_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
}

impl UploadSettings {
    pub fn form_endpoint(&self) -> &str {
        self.form_endpoint.as_deref().unwrap_or(&self.json_endpoint)
    }

    pub fn json_timeout(&self) -> Duration {
        Duration::from_secs(self.json_timeout_secs)
    }

    pub fn form_timeout(&self) -> Duration {
        Duration::from_secs(self.form_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSettings {
    /// Directory receiving downloaded files.
    pub download_dir: PathBuf,

    /// Ledger database file. Defaults to `~/.nassync/data/ledger.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// Keep local copies after a successful upload.
    #[serde(default = "default_true")]
    pub keep_downloads: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Upper bound for downloading and uploading one file.
    #[serde(default = "default_item_timeout")]
    pub item_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            item_timeout_secs: default_item_timeout(),
        }
    }
}

impl SyncSettings {
    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Accepted `X-API-Key` values.
    #[serde(default)]
    pub api_keys: Vec<String>,

    /// File holding a comma-separated list of accepted keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_keys_file: Option<String>,

    /// Environment variable holding a comma-separated list of accepted keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_keys_env_var: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_keys: Vec::new(),
            api_keys_file: None,
            api_keys_env_var: None,
        }
    }
}

impl ServerSettings {
    /// Collects the accepted API keys from the inline list and the
    /// configured file or environment variable.
    pub fn resolve_api_keys(&self) -> Result<Vec<String>, SecretError> {
        let mut keys: Vec<String> = self
            .api_keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if let Some(secret) = resolve_secret_optional(
            None,
            self.api_keys_file.as_deref(),
            self.api_keys_env_var.as_deref(),
        )? {
            keys.extend(split_list(secret.expose_secret()));
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_nas_port() -> u16 {
    5001
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_download_timeout() -> u64 {
    300
}

fn default_form_timeout() -> u64 {
    60
}

fn default_item_timeout() -> u64 {
    600
}

fn default_page_size() -> u32 {
    1000
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_resolve_api_keys_merges_sources() {
        std::env::set_var("NASSYNC_TEST_API_KEYS", "beta, gamma");
        let settings = ServerSettings {
            api_keys: vec!["alpha".to_string(), " ".to_string(), "beta".to_string()],
            api_keys_env_var: Some("NASSYNC_TEST_API_KEYS".to_string()),
            ..ServerSettings::default()
        };
        let keys = settings.resolve_api_keys().unwrap();
        assert_eq!(keys, vec!["alpha", "beta", "gamma"]);
        std::env::remove_var("NASSYNC_TEST_API_KEYS");
    }

    #[test]
    fn test_resolve_api_keys_missing_env_var() {
        let settings = ServerSettings {
            api_keys_env_var: Some("NASSYNC_UNSET_KEYS_98765".to_string()),
            ..ServerSettings::default()
        };
        assert!(matches!(
            settings.resolve_api_keys(),
            Err(SecretError::EnvVarNotSet { .. })
        ));
    }

    #[test]
    fn test_durations() {
        let sync = SyncSettings::default();
        assert_eq!(sync.item_timeout(), Duration::from_secs(600));
    }
}
