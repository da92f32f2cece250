//! Snapshot persistence seam
//!
//! The service pushes the canonical document to a [`SnapshotStore`] after
//! every call that changes it. Stores are keyed by the service id.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Persistence error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No snapshot stored for {0}")]
    NotFound(Uuid),
}

impl PersistenceError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Durable storage for document snapshots
pub trait SnapshotStore {
    fn store(&self, id: Uuid, data: &[u8]) -> Result<(), PersistenceError>;

    fn load(&self, id: Uuid) -> Result<Vec<u8>, PersistenceError>;

    fn exists(&self, id: Uuid) -> bool;
}

/// Writes each snapshot to `{base_dir}/{id}.json`
#[derive(Clone, Debug)]
pub struct LocalFileStore {
    base_dir: PathBuf,
}

impl LocalFileStore {
    /// Create the store, creating `base_dir` if needed
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, PersistenceError> {
        let path = base_dir.as_ref().to_path_buf();
        if !path.exists() {
            fs::create_dir_all(&path).map_err(|e| {
                PersistenceError::io(format!("failed to create {}", path.display()), e)
            })?;
        }
        Ok(Self { base_dir: path })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn file_path(&self, id: Uuid) -> PathBuf {
        self.base_dir.join(format!("{}.json", id))
    }
}

impl SnapshotStore for LocalFileStore {
    fn store(&self, id: Uuid, data: &[u8]) -> Result<(), PersistenceError> {
        let file_path = self.file_path(id);
        let mut file = File::create(&file_path).map_err(|e| {
            PersistenceError::io(format!("failed to create {}", file_path.display()), e)
        })?;
        file.write_all(data).map_err(|e| {
            PersistenceError::io(format!("failed to write {}", file_path.display()), e)
        })?;
        log::debug!("Stored {} byte snapshot at {}", data.len(), file_path.display());
        Ok(())
    }

    fn load(&self, id: Uuid) -> Result<Vec<u8>, PersistenceError> {
        let file_path = self.file_path(id);
        if !file_path.exists() {
            return Err(PersistenceError::NotFound(id));
        }
        let mut file = File::open(&file_path).map_err(|e| {
            PersistenceError::io(format!("failed to open {}", file_path.display()), e)
        })?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer).map_err(|e| {
            PersistenceError::io(format!("failed to read {}", file_path.display()), e)
        })?;
        Ok(buffer)
    }

    fn exists(&self, id: Uuid) -> bool {
        self.file_path(id).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_and_load() {
        let dir = tempdir().unwrap();
        let store = LocalFileStore::new(dir.path().join("snapshots")).unwrap();
        let id = Uuid::new_v4();

        assert!(!store.exists(id));
        store.store(id, br#"{"descriptor":{}}"#).unwrap();
        assert!(store.exists(id));
        assert_eq!(store.load(id).unwrap(), br#"{"descriptor":{}}"#.to_vec());

        store.store(id, b"{}").unwrap();
        assert_eq!(store.load(id).unwrap(), b"{}".to_vec());
    }

    #[test]
    fn test_load_missing() {
        let dir = tempdir().unwrap();
        let store = LocalFileStore::new(dir.path()).unwrap();
        let id = Uuid::new_v4();
        assert!(matches!(store.load(id), Err(PersistenceError::NotFound(missing)) if missing == id));
    }
}
