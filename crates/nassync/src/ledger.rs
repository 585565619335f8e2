//! Persistent ledger of per-file sync state.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use crate::db::sync_repo::{self, NewSyncRecord, SyncRecordRow};
use crate::db::{Database, DatabaseError};
use crate::metadata::ExtractedFileMetadata;

type Result<T> = std::result::Result<T, DatabaseError>;

/// Opaque ledger identifier of a sync record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a sync record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Uploaded,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Uploaded => "uploaded",
            SyncStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "uploaded" => Ok(SyncStatus::Uploaded),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(DatabaseError::CorruptValue {
                column: "status",
                reason: format!("unknown status '{}'", other),
            }),
        }
    }
}

/// One file's processing record.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRecord {
    pub id: RecordId,
    pub file_path: String,
    pub file_name: String,
    pub status: SyncStatus,
    pub local_path: Option<String>,
    pub error_message: Option<String>,
    pub response_data: Option<serde_json::Value>,
    pub upload_method: Option<String>,
    pub attempts: u32,
    pub industry: String,
    pub indicator: String,
    pub company: String,
    pub year: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SyncRecordRow> for SyncRecord {
    type Error = DatabaseError;

    fn try_from(row: SyncRecordRow) -> Result<Self> {
        let response_data = row
            .response_data
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()
            .map_err(|e| DatabaseError::CorruptValue {
                column: "response_data",
                reason: e.to_string(),
            })?;

        Ok(Self {
            id: RecordId(row.id),
            status: row.status.parse()?,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
            file_path: row.file_path,
            file_name: row.file_name,
            local_path: row.local_path,
            error_message: row.error_message,
            response_data,
            upload_method: row.upload_method,
            attempts: row.attempts,
            industry: row.industry,
            indicator: row.indicator,
            company: row.company,
            year: row.year,
        })
    }
}

fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::CorruptValue {
            column,
            reason: format!("'{}': {}", value, e),
        })
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Tracks which NAS files have been seen and how far each one got.
///
/// `file_path` is the natural key. Uniqueness is enforced by the schema, so
/// inserting the same path twice is harmless.
#[derive(Clone)]
pub struct SyncLedger {
    db: Database,
}

impl SyncLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns true if the path has ever been recorded.
    pub fn exists(&self, file_path: &str) -> Result<bool> {
        Ok(sync_repo::find_status(&self.db, file_path)?.is_some())
    }

    /// Returns true if the path reached the terminal `uploaded` state.
    pub fn is_successfully_processed(&self, file_path: &str) -> Result<bool> {
        Ok(sync_repo::find_status(&self.db, file_path)?.as_deref()
            == Some(SyncStatus::Uploaded.as_str()))
    }

    pub fn get_by_path(&self, file_path: &str) -> Result<Option<SyncRecord>> {
        sync_repo::find_by_path(&self.db, file_path)?
            .map(SyncRecord::try_from)
            .transpose()
    }

    pub fn get(&self, id: RecordId) -> Result<Option<SyncRecord>> {
        sync_repo::find_by_id(&self.db, id.0)?
            .map(SyncRecord::try_from)
            .transpose()
    }

    /// Creates a pending record for `metadata`, or returns the id of the
    /// record that already exists for its path.
    pub fn insert(&self, metadata: &ExtractedFileMetadata) -> Result<RecordId> {
        if let Some(id) = self.try_insert(metadata)? {
            return Ok(id);
        }
        sync_repo::find_by_path(&self.db, &metadata.file_path)?
            .map(|row| RecordId(row.id))
            .ok_or_else(|| DatabaseError::CorruptValue {
                column: "file_path",
                reason: format!("'{}' conflicted but is missing", metadata.file_path),
            })
    }

    /// Creates a pending record, returning `None` if the path already existed.
    pub fn try_insert(&self, metadata: &ExtractedFileMetadata) -> Result<Option<RecordId>> {
        let now = now();
        let id = sync_repo::insert_if_absent(
            &self.db,
            &NewSyncRecord {
                file_path: &metadata.file_path,
                file_name: &metadata.file_name,
                industry: &metadata.industry,
                indicator: &metadata.indicator,
                company: &metadata.company,
                year: &metadata.year,
                now: &now,
            },
        )?;
        if let Some(id) = id {
            debug!("Ledger insert {} for {}", id, metadata.file_path);
        }
        Ok(id.map(RecordId))
    }

    /// Puts a failed (or stale pending) record back to pending.
    pub fn reset_for_retry(&self, id: RecordId) -> Result<()> {
        sync_repo::reset_to_pending(&self.db, id.0, &now())
    }

    pub fn mark_downloaded(&self, id: RecordId, local_path: &Path) -> Result<()> {
        sync_repo::set_local_path(&self.db, id.0, &local_path.to_string_lossy(), &now())
    }

    pub fn mark_uploaded(
        &self,
        id: RecordId,
        response_data: &serde_json::Value,
        upload_method: &str,
    ) -> Result<()> {
        sync_repo::set_uploaded(
            &self.db,
            id.0,
            &response_data.to_string(),
            upload_method,
            &now(),
        )
    }

    pub fn mark_failed(&self, id: RecordId, error_message: &str) -> Result<()> {
        sync_repo::set_failed(&self.db, id.0, error_message, &now())
    }

    /// Lists records in `status`, least recently touched first.
    pub fn list_by_status(&self, status: SyncStatus, limit: u64) -> Result<Vec<SyncRecord>> {
        sync_repo::list_by_status(&self.db, status.as_str(), limit)?
            .into_iter()
            .map(SyncRecord::try_from)
            .collect()
    }

    pub fn stats(&self) -> Result<LedgerStats> {
        let mut stats = LedgerStats::default();
        for (status, count) in sync_repo::count_by_status(&self.db)? {
            match status.parse()? {
                SyncStatus::Pending => stats.pending = count,
                SyncStatus::Uploaded => stats.uploaded = count,
                SyncStatus::Failed => stats.failed = count,
            }
            stats.total += count;
        }
        stats.last_updated_at = sync_repo::find_last_updated_at(&self.db)?;
        Ok(stats)
    }
}

/// Record counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub total: u64,
    pub pending: u64,
    pub uploaded: u64,
    pub failed: u64,
    /// When any record last changed (RFC 3339).
    pub last_updated_at: Option<String>,
}
