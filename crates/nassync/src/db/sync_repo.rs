//! Sync record repository: CRUD operations for the `sync_records` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw sync record row from the database.
#[derive(Debug, Clone)]
pub struct SyncRecordRow {
    pub id: i64,
    pub file_path: String,
    pub file_name: String,
    pub status: String,
    pub local_path: Option<String>,
    pub error_message: Option<String>,
    pub response_data: Option<String>,
    pub upload_method: Option<String>,
    pub attempts: u32,
    pub industry: String,
    pub indicator: String,
    pub company: String,
    pub year: String,
    pub created_at: String,
    pub updated_at: String,
}

impl SyncRecordRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            file_path: row.get("file_path")?,
            file_name: row.get("file_name")?,
            status: row.get("status")?,
            local_path: row.get("local_path")?,
            error_message: row.get("error_message")?,
            response_data: row.get("response_data")?,
            upload_method: row.get("upload_method")?,
            attempts: row.get("attempts")?,
            industry: row.get("industry")?,
            indicator: row.get("indicator")?,
            company: row.get("company")?,
            year: row.get("year")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Fields required to create a new pending record.
#[derive(Debug, Clone)]
pub struct NewSyncRecord<'a> {
    pub file_path: &'a str,
    pub file_name: &'a str,
    pub industry: &'a str,
    pub indicator: &'a str,
    pub company: &'a str,
    pub year: &'a str,
    pub now: &'a str,
}

/// Inserts a pending record unless one already exists for the path.
///
/// Returns the new row id, or `None` when the path was already present.
pub fn insert_if_absent(
    db: &Database,
    record: &NewSyncRecord<'_>,
) -> Result<Option<i64>, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT INTO sync_records (file_path, file_name, status, industry, indicator,
             company, year, created_at, updated_at)
             VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(file_path) DO NOTHING",
            params![
                record.file_path,
                record.file_name,
                record.industry,
                record.indicator,
                record.company,
                record.year,
                record.now,
            ],
        )?;
        if inserted == 0 {
            Ok(None)
        } else {
            Ok(Some(conn.last_insert_rowid()))
        }
    })
}

/// Finds a record by its remote path.
pub fn find_by_path(db: &Database, file_path: &str) -> Result<Option<SyncRecordRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM sync_records WHERE file_path = ?1",
                params![file_path],
                SyncRecordRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Finds a record by its id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<SyncRecordRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM sync_records WHERE id = ?1",
                params![id],
                SyncRecordRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Returns the status of a path without loading the whole row.
pub fn find_status(db: &Database, file_path: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let status = conn
            .query_row(
                "SELECT status FROM sync_records WHERE file_path = ?1",
                params![file_path],
                |r| r.get::<_, String>(0),
            )
            .optional()?;
        Ok(status)
    })
}

/// Sets a record back to pending and clears its error.
pub fn reset_to_pending(db: &Database, id: i64, now: &str) -> Result<(), DatabaseError> {
    update_one(
        db,
        id,
        "UPDATE sync_records SET status = 'pending', error_message = NULL, updated_at = ?2
         WHERE id = ?1",
        params![id, now],
    )
}

/// Records where the downloaded copy of a file lives.
pub fn set_local_path(
    db: &Database,
    id: i64,
    local_path: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    update_one(
        db,
        id,
        "UPDATE sync_records SET local_path = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, local_path, now],
    )
}

/// Marks a record uploaded and stores the downstream response.
pub fn set_uploaded(
    db: &Database,
    id: i64,
    response_data: &str,
    upload_method: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    update_one(
        db,
        id,
        "UPDATE sync_records SET status = 'uploaded', response_data = ?2, upload_method = ?3,
         error_message = NULL, attempts = attempts + 1, updated_at = ?4
         WHERE id = ?1",
        params![id, response_data, upload_method, now],
    )
}

/// Marks a record failed with the causing message.
pub fn set_failed(
    db: &Database,
    id: i64,
    error_message: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    update_one(
        db,
        id,
        "UPDATE sync_records SET status = 'failed', error_message = ?2,
         attempts = attempts + 1, updated_at = ?3
         WHERE id = ?1",
        params![id, error_message, now],
    )
}

/// Lists records with the given status, oldest update first.
pub fn list_by_status(
    db: &Database,
    status: &str,
    limit: u64,
) -> Result<Vec<SyncRecordRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM sync_records WHERE status = ?1 ORDER BY updated_at ASC, id ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![status, limit as i64], SyncRecordRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts records grouped by status.
pub fn count_by_status(db: &Database) -> Result<Vec<(String, u64)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM sync_records GROUP BY status")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Finds the most recent `updated_at` across all records.
pub fn find_last_updated_at(db: &Database) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let value: Option<String> =
            conn.query_row("SELECT MAX(updated_at) FROM sync_records", [], |r| r.get(0))?;
        Ok(value)
    })
}

fn update_one(
    db: &Database,
    id: i64,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(sql, params)?;
        if changed == 0 {
            return Err(DatabaseError::RecordNotFound(id));
        }
        Ok(())
    })
}
