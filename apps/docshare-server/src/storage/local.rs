//! Local filesystem store for uploaded documents

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::config::UploadConfig;
use crate::error::StorageError;

/// Public URL prefix under which stored files are served
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

/// A file that has been written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Generated name on disk (`<uuid>.<ext>`)
    pub file_name: String,
    /// Public URL (`/uploads/<file_name>`)
    pub file_url: String,
    pub size: u64,
}

/// Upload directory plus the rules files must satisfy
#[derive(Clone)]
pub struct FileStore {
    inner: Arc<FileStoreInner>,
}

struct FileStoreInner {
    root: PathBuf,
    allowed_types: Vec<String>,
    max_file_size: u64,
}

impl FileStore {
    /// Open the store, creating the upload directory if needed
    pub async fn open(config: &UploadConfig) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(&config.dir).await?;
        tracing::info!("Upload directory ready at {}", config.dir.display());

        Ok(Self {
            inner: Arc::new(FileStoreInner {
                root: config.dir.clone(),
                allowed_types: config.allowed_types.iter().map(|t| t.to_lowercase()).collect(),
                max_file_size: config.max_file_size,
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn max_file_size(&self) -> u64 {
        self.inner.max_file_size
    }

    /// Lowercased extension of `file_name`, if it is on the allow-list
    pub fn check_file_type(&self, file_name: &str) -> Result<String, StorageError> {
        let extension = extension_of(file_name).unwrap_or_default();
        if !extension.is_empty() && self.inner.allowed_types.contains(&extension) {
            Ok(extension)
        } else {
            Err(StorageError::InvalidFileType {
                extension,
                allowed: self.inner.allowed_types.join(", "),
            })
        }
    }

    pub fn check_size(&self, size: u64) -> Result<(), StorageError> {
        if size > self.inner.max_file_size {
            return Err(StorageError::FileTooLarge {
                size,
                max: self.inner.max_file_size,
            });
        }
        Ok(())
    }

    /// Write `data` under a fresh unique name with the given extension
    pub async fn save(&self, extension: &str, data: &[u8]) -> Result<StoredFile, StorageError> {
        let file_name = format!("{}.{}", Uuid::new_v4(), extension);
        tokio::fs::write(self.inner.root.join(&file_name), data).await?;

        tracing::debug!(file_name = %file_name, size = data.len(), "Stored upload");

        Ok(StoredFile {
            file_url: format!("{}/{}", UPLOADS_URL_PREFIX, file_name),
            file_name,
            size: data.len() as u64,
        })
    }

    /// Remove a stored file. Returns whether a file was deleted.
    pub async fn remove(&self, file_name: &str) -> bool {
        let Some(path) = self.resolve(file_name) else {
            return false;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!("Failed to delete {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Read a stored file into memory
    pub async fn read(&self, file_name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self
            .resolve(file_name)
            .ok_or_else(|| StorageError::FileNotFound(file_name.to_string()))?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::FileNotFound(file_name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Path of a stored file; only bare file names inside the root are accepted
    fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        let name = Path::new(file_name).file_name()?;
        if name != file_name || file_name.starts_with('.') {
            return None;
        }
        Some(self.inner.root.join(name))
    }
}

/// Lowercased extension without the dot
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}
