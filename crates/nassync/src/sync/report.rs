use serde::Serialize;

use crate::ledger::RecordId;
use crate::metadata::ExtractedFileMetadata;

/// Where in the per-file flow an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Ledger,
    Download,
    Upload,
    Timeout,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Ledger => "ledger",
            FailureStage::Download => "download",
            FailureStage::Upload => "upload",
            FailureStage::Timeout => "timeout",
        }
    }
}

/// A per-file failure. Never aborts the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub stage: FailureStage,
    pub message: String,
}

impl ItemFailure {
    pub fn new(stage: FailureStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub folders_scanned: usize,
    pub folders_failed: usize,
    pub total_files_found: usize,
    pub valid_files: usize,
    pub invalid_files: usize,
    pub new_files: usize,
    pub retry_files: usize,
    pub already_uploaded: usize,
    pub files_queued: usize,
    pub files_excluded: usize,
    pub files_cancelled: usize,
    pub batch_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingResults {
    pub successful: usize,
    pub failed: usize,
    pub attempted: usize,
    /// Percentage of attempted items that uploaded, two decimals.
    pub success_rate: f64,
}

impl ProcessingResults {
    pub fn from_counts(successful: usize, failed: usize) -> Self {
        let attempted = successful + failed;
        let success_rate = if attempted == 0 {
            0.0
        } else {
            ((successful as f64 / attempted as f64) * 10_000.0).round() / 100.0
        };
        Self {
            successful,
            failed,
            attempted,
            success_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidFile {
    pub file_path: String,
    pub file_name: String,
    pub errors: Vec<String>,
}

impl From<&ExtractedFileMetadata> for InvalidFile {
    fn from(meta: &ExtractedFileMetadata) -> Self {
        Self {
            file_path: meta.file_path.clone(),
            file_name: meta.file_name.clone(),
            errors: meta.validation_errors.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileValidation {
    pub invalid_count: usize,
    pub invalid_files: Vec<InvalidFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub record_id: RecordId,
    pub file_path: String,
    pub upload_method: String,
    /// `None` when the local copy was removed after upload.
    pub local_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub file_path: String,
    pub stage: FailureStage,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderError {
    pub folder_path: String,
    pub error: String,
}

/// Outcome of one completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub message: String,
    pub summary: SyncSummary,
    pub processing_results: ProcessingResults,
    pub file_validation: FileValidation,
    pub uploaded_files: Vec<UploadedFile>,
    pub failed_files: Vec<FailedFile>,
    pub folder_errors: Vec<FolderError>,
}

impl SyncReport {
    pub(crate) fn build(
        summary: SyncSummary,
        file_validation: FileValidation,
        uploaded_files: Vec<UploadedFile>,
        failed_files: Vec<FailedFile>,
        folder_errors: Vec<FolderError>,
    ) -> Self {
        let processing_results =
            ProcessingResults::from_counts(uploaded_files.len(), failed_files.len());
        let success = processing_results.failed == 0;

        let mut message = format!(
            "Sync completed: {} uploaded, {} failed, {} already uploaded, {} invalid",
            processing_results.successful,
            processing_results.failed,
            summary.already_uploaded,
            summary.invalid_files,
        );
        if summary.files_excluded > 0 {
            message.push_str(&format!(
                ", {} deferred by batch limit",
                summary.files_excluded
            ));
        }
        if summary.files_cancelled > 0 {
            message.push_str(&format!(", {} cancelled", summary.files_cancelled));
        }

        Self {
            success,
            message,
            summary,
            processing_results,
            file_validation,
            uploaded_files,
            failed_files,
            folder_errors,
        }
    }
}
