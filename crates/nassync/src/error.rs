use std::path::PathBuf;
use thiserror::Error;

use crate::nas::NasError;
use crate::upload::UploadError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    /// Logging in to the NAS failed; the run was aborted.
    #[error("NAS authentication failed: {0}")]
    Authentication(#[source] NasError),

    /// Listing the base folder failed; the run was aborted.
    #[error("NAS folder discovery failed: {0}")]
    Discovery(#[source] NasError),

    /// Building the NAS HTTP client failed.
    #[error("NAS client setup failed: {0}")]
    NasClient(#[source] NasError),

    /// Building the ingestion HTTP client failed.
    #[error("Upload client setup failed: {0}")]
    UploadClient(#[source] UploadError),

    /// The background task driving a run panicked or was aborted.
    #[error("Sync task did not finish: {0}")]
    Task(String),
}

impl SyncError {
    /// Stable machine-readable code for callers of the trigger endpoint.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::Authentication(_) => "NAS_AUTH_FAILED",
            SyncError::Discovery(_) => "NAS_DISCOVERY_FAILED",
            _ => "SYNC_FAILED",
        }
    }

    /// True when the failure originated at the NAS rather than locally.
    pub fn is_upstream(&self) -> bool {
        matches!(self, SyncError::Authentication(_) | SyncError::Discovery(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("No config file given (pass --config or set {0})")]
    MissingPath(&'static str),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_codes() {
        let auth = SyncError::Authentication(NasError::Timeout("login".into()));
        assert_eq!(auth.error_code(), "NAS_AUTH_FAILED");
        assert!(auth.is_upstream());

        let discovery = SyncError::Discovery(NasError::PathNotFound("/ESG".into()));
        assert_eq!(discovery.error_code(), "NAS_DISCOVERY_FAILED");
        assert!(discovery.is_upstream());

        let task = SyncError::Task("panicked".into());
        assert_eq!(task.error_code(), "SYNC_FAILED");
        assert!(!task.is_upstream());
    }

    #[test]
    fn test_client_setup_errors_keep_their_source() {
        let nas = SyncError::NasClient(NasError::Connection("bad TLS backend".into()));
        let source = nas.source().unwrap();
        assert!(source.downcast_ref::<NasError>().is_some());
        assert!(nas.to_string().contains("bad TLS backend"));

        let upload = SyncError::UploadClient(UploadError::Client("no resolver".into()));
        let source = upload.source().unwrap();
        assert!(matches!(
            source.downcast_ref::<UploadError>(),
            Some(UploadError::Client(_))
        ));
        assert!(!upload.is_upstream());
    }
}
