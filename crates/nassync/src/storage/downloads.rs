use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, warn};

use crate::error::StorageError;

/// Local landing area for files pulled from the NAS.
///
/// Every download gets a fresh `<timestamp>_<uuid8>.<ext>` name so two
/// remote files with the same name never collide.
#[derive(Debug, Clone)]
pub struct DownloadStore {
    directory: PathBuf,
}

impl DownloadStore {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Reserves a new empty file for `original_name` and returns its path.
    ///
    /// The file is created with `create_new`, so a returned path is never
    /// shared with another download.
    pub fn allocate(&self, original_name: &str) -> Result<PathBuf, StorageError> {
        self.ensure_directory()?;

        let extension = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty());

        for _ in 0..8 {
            let candidate = self.directory.join(generate_name(extension));
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(_) => {
                    debug!("Allocated {} for {}", candidate.display(), original_name);
                    return Ok(candidate);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile {
                        path: candidate,
                        source: e,
                    })
                }
            }
        }

        Err(StorageError::WriteFile {
            path: self.directory.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "could not allocate a unique download name",
            ),
        })
    }

    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })
    }

    /// Deletes a local copy. A missing file is not an error.
    pub fn remove(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }

    fn ensure_directory(&self) -> Result<(), StorageError> {
        if !self.directory.exists() {
            std::fs::create_dir_all(&self.directory).map_err(|e| {
                StorageError::CreateDirectory {
                    path: self.directory.clone(),
                    source: e,
                }
            })?;
        }
        Ok(())
    }
}

fn generate_name(extension: Option<&str>) -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let id = uuid::Uuid::new_v4().simple().to_string();
    let short = &id[..8];
    match extension {
        Some(ext) => format!("{}_{}.{}", timestamp, short, ext),
        None => format!("{}_{}", timestamp, short),
    }
}
