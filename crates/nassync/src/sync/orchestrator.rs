use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::db::{default_database_path, Database, DatabaseError};
use crate::error::{ConfigError, Result, SyncError};
use crate::ledger::{RecordId, SyncLedger, SyncRecord, SyncStatus};
use crate::metadata::{ExtractedFileMetadata, PathMetadataExtractor};
use crate::nas::{NasClient, NasSession};
use crate::sanitize::{hash_path, redact_path};
use crate::secrets::resolve_secret;
use crate::storage::DownloadStore;
use crate::sync::report::{
    FailedFile, FailureStage, FileValidation, FolderError, InvalidFile, ItemFailure, SyncReport,
    SyncSummary, UploadedFile,
};
use crate::upload::{UploadClient, UploadOutcome, UploadRequest};

/// Per-run knobs supplied by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Process at most this many queued files; the rest wait for a later run.
    pub batch_size: Option<usize>,
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Authenticating,
    Discovering,
    Extracting,
    Reconciling,
    Processing,
    LoggingOut,
    Completed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Authenticating => "authenticating",
            RunPhase::Discovering => "discovering",
            RunPhase::Extracting => "extracting",
            RunPhase::Reconciling => "reconciling",
            RunPhase::Processing => "processing",
            RunPhase::LoggingOut => "logging_out",
            RunPhase::Completed => "completed",
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkKind {
    New,
    Retry,
}

struct WorkItem {
    id: RecordId,
    kind: WorkKind,
    meta: ExtractedFileMetadata,
}

enum Reconciled {
    New(RecordId),
    Retry(RecordId),
    AlreadyUploaded,
}

fn classify(record: &SyncRecord) -> Reconciled {
    match record.status {
        SyncStatus::Uploaded => Reconciled::AlreadyUploaded,
        SyncStatus::Pending | SyncStatus::Failed => Reconciled::Retry(record.id),
    }
}

/// Entries discovered across all folders, plus the folders that could not
/// be listed.
struct Discovery {
    folders_scanned: usize,
    files: Vec<String>,
    folder_errors: Vec<FolderError>,
}

/// Drives one NAS → ingestion sync run at a time.
pub struct SyncOrchestrator {
    nas: NasClient,
    uploader: UploadClient,
    ledger: SyncLedger,
    extractor: PathMetadataExtractor,
    store: DownloadStore,
    base_path: String,
    keep_downloads: bool,
    item_timeout: Duration,
    run_lock: tokio::sync::Mutex<()>,
    phase: Mutex<RunPhase>,
    shutdown: Arc<AtomicBool>,
}

impl SyncOrchestrator {
    /// Production constructor: opens the ledger database named in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let db_path = config
            .storage
            .database_path
            .clone()
            .or_else(default_database_path)
            .ok_or_else(|| ConfigError::Validation {
                message: "storage.databasePath is not set and no home directory was found"
                    .to_string(),
            })?;
        let db = Database::open(&db_path)?;
        Self::new(config, SyncLedger::new(db))
    }

    pub fn new(config: &Config, ledger: SyncLedger) -> Result<Self> {
        let nas_settings = &config.nas;
        let password = resolve_secret(
            nas_settings.password.as_deref(),
            nas_settings.password_file.as_deref(),
            nas_settings.password_env_var.as_deref(),
        )?;

        let nas = NasClient::new(nas_settings, password).map_err(SyncError::NasClient)?;
        let uploader = UploadClient::new(&config.upload).map_err(SyncError::UploadClient)?;

        Ok(Self {
            nas,
            uploader,
            ledger,
            extractor: PathMetadataExtractor::new(),
            store: DownloadStore::new(&config.storage.download_dir),
            base_path: nas_settings.base_path.clone(),
            keep_downloads: config.storage.keep_downloads,
            item_timeout: config.sync.item_timeout(),
            run_lock: tokio::sync::Mutex::new(()),
            phase: Mutex::new(RunPhase::Idle),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_extractor(mut self, extractor: PathMetadataExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn ledger(&self) -> &SyncLedger {
        &self.ledger
    }

    /// Flag checked between items. Setting it stops the current run after
    /// the item in flight; the remaining items are reported as cancelled.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn current_phase(&self) -> RunPhase {
        self.phase
            .lock()
            .map(|phase| *phase)
            .unwrap_or(RunPhase::Idle)
    }

    /// Runs one sync on a background task and waits for it.
    ///
    /// The run keeps going when the caller's future is dropped (a client
    /// disconnecting from the trigger endpoint, for example), so the NAS
    /// session is always logged out and in-flight files are cleaned up.
    pub async fn run_detached(self: &Arc<Self>, options: SyncOptions) -> Result<SyncReport> {
        self.spawn_run(options)
            .await
            .map_err(|e| SyncError::Task(e.to_string()))?
    }

    /// Starts one sync on a background task. Dropping the handle detaches
    /// the run; it still completes.
    pub fn spawn_run(self: &Arc<Self>, options: SyncOptions) -> JoinHandle<Result<SyncReport>> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.run(options).await })
    }

    /// Runs one sync. Concurrent callers wait for the active run to finish.
    ///
    /// The future must be driven to completion: dropping it midway skips
    /// the NAS logout and can leave the current item's local file behind.
    /// Callers that may be cancelled use [`Self::spawn_run`] or
    /// [`Self::run_detached`].
    pub async fn run(&self, options: SyncOptions) -> Result<SyncReport> {
        let _guard = self.run_lock.lock().await;

        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let short_id = &run_id[..8];
        let span = info_span!("nas_sync", run_id = %short_id);

        let result = self.run_locked(options).instrument(span).await;
        self.set_phase(RunPhase::Idle);
        result
    }

    async fn run_locked(&self, options: SyncOptions) -> Result<SyncReport> {
        self.set_phase(RunPhase::Authenticating);
        let mut session = self
            .nas
            .login()
            .await
            .map_err(SyncError::Authentication)?;

        let result = self.run_session(&session, options).await;

        self.set_phase(RunPhase::LoggingOut);
        session.logout().await;

        let report = result?;
        self.set_phase(RunPhase::Completed);
        info!(
            uploaded = report.processing_results.successful,
            failed = report.processing_results.failed,
            "{}",
            report.message
        );
        Ok(report)
    }

    async fn run_session(
        &self,
        session: &NasSession<'_>,
        options: SyncOptions,
    ) -> Result<SyncReport> {
        self.set_phase(RunPhase::Discovering);
        let discovery = self.discover(session).await?;

        let mut summary = SyncSummary {
            folders_scanned: discovery.folders_scanned,
            folders_failed: discovery.folder_errors.len(),
            total_files_found: discovery.files.len(),
            batch_limit: options.batch_size,
            ..SyncSummary::default()
        };

        self.set_phase(RunPhase::Extracting);
        let (valid, invalid): (Vec<_>, Vec<_>) = discovery
            .files
            .iter()
            .map(|path| self.extractor.extract(path))
            .partition(|meta| meta.is_valid);
        summary.valid_files = valid.len();
        summary.invalid_files = invalid.len();
        for meta in &invalid {
            debug!(
                file = %redact_path(&meta.file_path),
                errors = ?meta.validation_errors,
                "Skipping invalid file"
            );
        }
        let file_validation = FileValidation {
            invalid_count: invalid.len(),
            invalid_files: invalid.iter().map(InvalidFile::from).collect(),
        };

        self.set_phase(RunPhase::Reconciling);
        let mut failed_files = Vec::new();
        let mut new_items = Vec::new();
        let mut retry_items = Vec::new();
        for meta in valid {
            match self.reconcile(&meta) {
                Ok(Reconciled::New(id)) => new_items.push(WorkItem {
                    id,
                    kind: WorkKind::New,
                    meta,
                }),
                Ok(Reconciled::Retry(id)) => retry_items.push(WorkItem {
                    id,
                    kind: WorkKind::Retry,
                    meta,
                }),
                Ok(Reconciled::AlreadyUploaded) => summary.already_uploaded += 1,
                Err(e) => {
                    warn!(file = %redact_path(&meta.file_path), error = %e, "Ledger lookup failed");
                    let failure = ledger_failed(e);
                    failed_files.push(FailedFile {
                        file_path: meta.file_path,
                        stage: failure.stage,
                        error: failure.message,
                    });
                }
            }
        }
        summary.new_files = new_items.len();
        summary.retry_files = retry_items.len();

        let mut queue = new_items;
        queue.extend(retry_items);
        if let Some(limit) = options.batch_size {
            if queue.len() > limit {
                summary.files_excluded = queue.len() - limit;
                queue.truncate(limit);
            }
        }
        summary.files_queued = queue.len();
        info!(
            new = summary.new_files,
            retry = summary.retry_files,
            queued = summary.files_queued,
            excluded = summary.files_excluded,
            "Work queue ready"
        );

        self.set_phase(RunPhase::Processing);
        let mut uploaded_files = Vec::new();
        for (index, item) in queue.iter().enumerate() {
            if self.shutdown.load(Ordering::Relaxed) {
                summary.files_cancelled = queue.len() - index;
                warn!(
                    remaining = summary.files_cancelled,
                    "Shutdown requested, leaving remaining items for the next run"
                );
                break;
            }

            let span = info_span!(
                "sync_item",
                record_id = %item.id,
                file = %redact_path(&item.meta.file_path),
                path_hash = %hash_path(&item.meta.file_path),
            );
            match self.process_item(session, item).instrument(span).await {
                Ok(uploaded) => uploaded_files.push(uploaded),
                Err(failure) => failed_files.push(FailedFile {
                    file_path: item.meta.file_path.clone(),
                    stage: failure.stage,
                    error: failure.message,
                }),
            }
        }

        Ok(SyncReport::build(
            summary,
            file_validation,
            uploaded_files,
            failed_files,
            discovery.folder_errors,
        ))
    }

    async fn discover(&self, session: &NasSession<'_>) -> Result<Discovery> {
        let folders = session
            .list_folders(&self.base_path)
            .await
            .map_err(SyncError::Discovery)?;
        info!(base_path = %self.base_path, folders = folders.len(), "Discovered folders");

        let mut discovery = Discovery {
            folders_scanned: 0,
            files: Vec::new(),
            folder_errors: Vec::new(),
        };
        for folder in folders {
            match session.list_files(&folder.path).await {
                Ok(files) => {
                    discovery.folders_scanned += 1;
                    discovery.files.extend(files.into_iter().map(|f| f.path));
                }
                Err(e) => {
                    warn!(folder = %folder.path, error = %e, "Failed to list folder, skipping");
                    discovery.folder_errors.push(FolderError {
                        folder_path: folder.path,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(discovery)
    }

    fn reconcile(
        &self,
        meta: &ExtractedFileMetadata,
    ) -> std::result::Result<Reconciled, DatabaseError> {
        if let Some(record) = self.ledger.get_by_path(&meta.file_path)? {
            return Ok(classify(&record));
        }
        if let Some(id) = self.ledger.try_insert(meta)? {
            return Ok(Reconciled::New(id));
        }

        // Another writer inserted the path between the lookup and the insert.
        debug!(file = %redact_path(&meta.file_path), "Lost insert race, re-reading record");
        let record = self
            .ledger
            .get_by_path(&meta.file_path)?
            .ok_or_else(|| DatabaseError::CorruptValue {
                column: "file_path",
                reason: format!("'{}' conflicted but is missing", meta.file_path),
            })?;
        Ok(classify(&record))
    }

    async fn process_item(
        &self,
        session: &NasSession<'_>,
        item: &WorkItem,
    ) -> std::result::Result<UploadedFile, ItemFailure> {
        if item.kind == WorkKind::Retry {
            self.ledger
                .reset_for_retry(item.id)
                .map_err(|e| self.record_failure(item, ledger_failed(e)))?;
        }

        let local_path = self
            .store
            .allocate(&item.meta.file_name)
            .map_err(|e| self.record_failure(item, download_failed(e)))?;

        let transfer = self.transfer(session, item, &local_path);
        let outcome = match tokio::time::timeout(self.item_timeout, transfer).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(failure)) => {
                self.store.remove(&local_path);
                return Err(self.record_failure(item, failure));
            }
            Err(_) => {
                self.store.remove(&local_path);
                let failure = ItemFailure::new(
                    FailureStage::Timeout,
                    format!("timed out after {}s", self.item_timeout.as_secs()),
                );
                return Err(self.record_failure(item, failure));
            }
        };

        self.complete(item, local_path, outcome)
            .map_err(|failure| self.record_failure(item, failure))
    }

    async fn transfer(
        &self,
        session: &NasSession<'_>,
        item: &WorkItem,
        local_path: &Path,
    ) -> std::result::Result<UploadOutcome, ItemFailure> {
        let bytes = session
            .download_to(&item.meta.file_path, local_path)
            .await
            .map_err(download_failed)?;
        debug!(bytes, "Downloaded");

        let content = self.store.read(local_path).await.map_err(download_failed)?;

        let meta = &item.meta;
        self.uploader
            .upload(&UploadRequest {
                file_name: &meta.file_name,
                content: &content,
                industry: &meta.industry,
                indicator: &meta.indicator,
                company: &meta.company,
                year: &meta.year,
            })
            .await
            .map_err(|e| ItemFailure::new(FailureStage::Upload, format!("upload failed: {}", e)))
    }

    fn complete(
        &self,
        item: &WorkItem,
        local_path: PathBuf,
        outcome: UploadOutcome,
    ) -> std::result::Result<UploadedFile, ItemFailure> {
        self.ledger
            .mark_downloaded(item.id, &local_path)
            .map_err(ledger_failed)?;
        self.ledger
            .mark_uploaded(item.id, &outcome.response, outcome.method.as_str())
            .map_err(ledger_failed)?;

        let local_path = if self.keep_downloads {
            Some(local_path.to_string_lossy().into_owned())
        } else {
            self.store.remove(&local_path);
            None
        };

        info!(method = %outcome.method, "File synced");
        Ok(UploadedFile {
            record_id: item.id,
            file_path: item.meta.file_path.clone(),
            upload_method: outcome.method.as_str().to_string(),
            local_path,
        })
    }

    /// Persists `failure` on the item's record and hands it back.
    fn record_failure(&self, item: &WorkItem, failure: ItemFailure) -> ItemFailure {
        warn!(stage = failure.stage.as_str(), error = %failure, "Item failed");
        if let Err(e) = self.ledger.mark_failed(item.id, &failure.message) {
            error!(error = %e, "Failed to record item failure in the ledger");
        }
        failure
    }

    fn set_phase(&self, phase: RunPhase) {
        if let Ok(mut current) = self.phase.lock() {
            *current = phase;
        }
        match phase {
            RunPhase::Idle => debug!(phase = %phase, "Sync phase"),
            _ => info!(phase = %phase, "Sync phase"),
        }
    }
}

fn download_failed(e: impl std::fmt::Display) -> ItemFailure {
    ItemFailure::new(FailureStage::Download, format!("download failed: {}", e))
}

fn ledger_failed(e: DatabaseError) -> ItemFailure {
    ItemFailure::new(FailureStage::Ledger, format!("ledger error: {}", e))
}
