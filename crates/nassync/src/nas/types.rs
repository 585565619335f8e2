use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sub-folder of the configured base path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Folder {
    pub path: String,
    pub name: String,
}

/// A file inside a folder, with the attributes requested from FileStation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

/// `{"success": .., "data": .., "error": {"code": ..}}` wrapper around every
/// DSM web API answer.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiErrorBody>,
}

impl<T> ApiEnvelope<T> {
    pub fn error_code(&self) -> Option<i64> {
        self.error.as_ref().map(|e| e.code)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub code: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginData {
    pub sid: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListData {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub files: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawEntry {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub isdir: bool,
    pub additional: Option<RawAdditional>,
    /// Present when `getinfo` could not resolve the entry.
    pub code: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAdditional {
    pub size: Option<u64>,
    pub time: Option<RawTime>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTime {
    pub mtime: Option<i64>,
}

impl RawEntry {
    pub fn into_folder(self) -> Folder {
        Folder {
            path: self.path,
            name: self.name,
        }
    }

    pub fn into_file(self) -> FileEntry {
        let (size, mtime) = match self.additional {
            Some(additional) => (
                additional.size.unwrap_or(0),
                additional.time.and_then(|t| t.mtime),
            ),
            None => (0, None),
        };
        FileEntry {
            path: self.path,
            name: self.name,
            size,
            modified_at: mtime.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        }
    }
}
