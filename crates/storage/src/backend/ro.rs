//! Readonly storage backend decorator.
//!
//! This module provides a storage backend implementation that wraps other
//! implementations and prevents write operations from executing, but
//! indicating success on return.

use async_trait::async_trait;
use std::path::Path;

use crate::backend::{ListingCapableBackend, StorageBackend};
use crate::error::Result;
use crate::file::{DirEntry, FileMeta};

/// Read-only storage backend.
///
/// Wraps another backend and silently drops all write operations, logging an
/// [`info event`](tracing::Event). Reports `readonly() == true` so the
/// scanner records read-only permissions on cache entries.
///
/// The wrapper is generic over the inner backend so a listing-capable inner
/// backend stays listing-capable when wrapped.
#[derive(Clone)]
pub struct ReadOnlyBackend<B> {
    inner: B,
}
impl<B> ReadOnlyBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<B: StorageBackend> StorageBackend for ReadOnlyBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn readonly(&self) -> bool {
        true
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn stat(&self, path: &Path) -> Result<FileMeta> {
        self.inner.stat(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        tracing::info!(path = %path.display(), bytes = data.len(), "Skipping write during read-only mode");
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        tracing::info!(path = %path.display(), "Skipping delete during read-only mode");
        Ok(())
    }
}

#[async_trait]
impl<B: ListingCapableBackend> ListingCapableBackend for ReadOnlyBackend<B> {
    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        self.inner.list_dir(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;

    #[tokio::test]
    async fn test_writes_are_dropped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let inner = LocalBackend::new("name", temp_dir.path()).unwrap();
        inner.write(Path::new("kept.txt"), b"data").await.unwrap();

        let backend = ReadOnlyBackend::new(inner);
        assert!(backend.readonly());
        backend.write(Path::new("dropped.txt"), b"data").await.unwrap();
        backend.delete(Path::new("kept.txt")).await.unwrap();
        assert!(!backend.exists(Path::new("dropped.txt")).await.unwrap());
        assert!(backend.exists(Path::new("kept.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_listing_passes_through() {
        let temp_dir = tempfile::tempdir().unwrap();
        let inner = LocalBackend::new("name", temp_dir.path()).unwrap();
        inner.write(Path::new("one.txt"), b"data").await.unwrap();

        let backend = ReadOnlyBackend::new(inner);
        let entries = backend.list_dir(Path::new("")).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "one.txt");
    }
}
