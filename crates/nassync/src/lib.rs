pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod metadata;
pub mod nas;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod sync;
pub mod upload;

pub use config::{load_config, load_config_from_str, Config};
pub use error::{ConfigError, Result, StorageError, SyncError};
pub use ledger::{LedgerStats, RecordId, SyncLedger, SyncRecord, SyncStatus};
pub use metadata::{ExtractedFileMetadata, PathMetadataExtractor};
pub use nas::{NasClient, NasError, NasSession};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use storage::DownloadStore;
pub use sync::{RunPhase, SyncOptions, SyncOrchestrator, SyncReport};
pub use upload::{UploadClient, UploadError, UploadMethod, UploadOutcome};
