//! Storage for uploaded file bytes
//!
//! Keys are relative, slash-separated paths such as
//! `documents/{owner}/{uuid}/{file}`.

use crate::error::{Result, StoreError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub trait BlobStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Returns false if nothing was stored under `key`
    fn delete(&self, key: &str) -> Result<bool>;
}

/// Blobs as plain files below a root directory
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, seg| path.join(seg)))
    }
}

/// Reject keys that could escape the root or are awkward on disk
pub fn validate_key(key: &str) -> Result<()> {
    let invalid = || StoreError::InvalidBlobKey(key.to_string());

    if key.is_empty() || key.len() > 512 {
        return Err(invalid());
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(invalid());
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(invalid());
        }
    }
    Ok(())
}

impl BlobStore for LocalBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        tracing::debug!(key = %key, size = bytes.len(), "Stored blob");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
