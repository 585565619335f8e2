//! The batch driver: discover → extract → reconcile → process → report.

mod orchestrator;
pub mod report;

pub use orchestrator::{RunPhase, SyncOptions, SyncOrchestrator};
pub use report::{
    FailedFile, FailureStage, FileValidation, FolderError, InvalidFile, ItemFailure,
    ProcessingResults, SyncReport, SyncSummary, UploadedFile,
};
