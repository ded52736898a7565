//! Local filesystem storage backend.
//!
//! This module provides a storage backend implementation for the local
//! filesystem. Files live under a configured root directory and are accessed
//! using standard filesystem operations via `tokio::fs` for async I/O. The
//! local filesystem has real directories, so this backend is listing-capable
//! and pairs with the full-tree scanner.

use crate::backend::{ListingCapableBackend, StorageBackend};
use crate::error::{ErrorKind, Result};
use crate::file::{DirEntry, FileKind, FileMeta};
use crate::path::validate as validate_path;
use async_trait::async_trait;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Local filesystem storage backend.
///
/// Stores files in a directory on the local filesystem. All paths are relative
/// to the configured root directory.
///
/// # Examples
///
/// ```no_run
/// use burrow_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("local", "/path/to/files")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory all relative paths resolve under
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Arguments
    /// * `root` - Absolute path to the storage root directory
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }

        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Use non-async here; it'll only happen once on backend
            // construction and it's not worth the hassle of making the
            // constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }

        Ok(Self { name: name.into(), root })
    }

    /// Get the absolute path for a relative storage path.
    ///
    /// Validates the path and joins it with the root directory.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Re-use the same conversion from filesystem metadata for both listing
    /// and stat.
    fn metadata(path: &Path, metadata: &Metadata) -> Result<FileMeta> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
        let kind = match metadata.is_dir() {
            true => FileKind::Folder,
            false => FileKind::File,
        };
        Ok(FileMeta::new(path, metadata.len(), modified, kind))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn stat(&self, path: &Path) -> Result<FileMeta> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        Self::metadata(path, &metadata)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        // Create parent directories if needed, to keep behaviour consistent
        // with object-store backends where prefixes spring into existence.
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        Ok(fs::write(&abs_path, data).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }
}

#[async_trait]
impl ListingCapableBackend for LocalBackend {
    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let relative = validate_path(path)?;
        let abs_path = self.root.join(&relative);
        let mut reader = match fs::read_dir(&abs_path).await {
            Ok(reader) => reader,
            // To stay consistent with the behaviour of object-store backends,
            // asking for the contents of a directory that doesn't exist
            // results in an empty list, not an error.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => exn::bail!(Self::map_io_error(err, path)),
        };
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(|e| Self::map_io_error(e, path))? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                // The cache keys entries by UTF-8 path; anything else can't
                // be tracked.
                tracing::warn!(folder = %path.display(), "skipping entry with non-UTF8 name");
                continue;
            };
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // Racing deletes between read_dir and stat lose the entry.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => exn::bail!(Self::map_io_error(err, &entry.path())),
            };
            if !metadata.is_dir() && !metadata.is_file() {
                // Note: silently drop what is most likely a broken symlink.
                continue;
            }
            let child = relative.join(&name);
            entries.push(DirEntry {
                meta: Self::metadata(&child, &metadata)?,
                name,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("name", "relative/path").is_err());
        assert!(LocalBackend::new("name", "./relative").is_err());
    }

    #[test]
    fn test_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let expected = temp_dir.path().join("documents/report.txt");
        assert_eq!(backend.absolute_path(Path::new("documents/report.txt")).unwrap(), expected);
        // Path traversal is prevented
        assert!(backend.absolute_path(Path::new("../etc/passwd")).is_err());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let data = b"Hello, world!";
        backend.write(Path::new("test.txt"), data).await.unwrap();
        let read_data = backend.read(Path::new("test.txt")).await.unwrap();
        assert_eq!(read_data, data);
    }

    #[tokio::test]
    async fn test_write_creates_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        backend.write(Path::new("a/b/c/file.txt"), b"data").await.unwrap();
        assert!(backend.exists(Path::new("a/b/c/file.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_exists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        assert!(!backend.exists(Path::new("nonexistent.txt")).await.unwrap());
        backend.write(Path::new("exists.txt"), b"data").await.unwrap();
        assert!(backend.exists(Path::new("exists.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        backend.write(Path::new("file.txt"), b"data").await.unwrap();
        assert!(backend.exists(Path::new("file.txt")).await.unwrap());
        backend.delete(Path::new("file.txt")).await.unwrap();
        assert!(!backend.exists(Path::new("file.txt")).await.unwrap());
        // Deleting nonexistent file returns error
        let result = backend.delete(Path::new("nonexistent.txt")).await;
        let err = result.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stat() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let data = b"Hello, world!";
        backend.write(Path::new("file.txt"), data).await.unwrap();
        let meta = backend.stat(Path::new("file.txt")).await.unwrap();
        assert_eq!(meta.path, PathBuf::from("file.txt"));
        assert_eq!(meta.size, data.len() as u64);
        assert_eq!(meta.kind, FileKind::File);
    }

    #[tokio::test]
    async fn test_stat_root_is_folder() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let meta = backend.stat(Path::new("")).await.unwrap();
        assert_eq!(meta.kind, FileKind::Folder);
    }

    #[tokio::test]
    async fn test_list_dir_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let entries = backend.list_dir(Path::new("")).await.unwrap();
        assert_eq!(entries.len(), 0);
    }

    #[tokio::test]
    async fn test_list_dir_nonexistent_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        let entries = backend.list_dir(Path::new("nope")).await.unwrap();
        assert_eq!(entries.len(), 0);
    }

    #[tokio::test]
    async fn test_list_dir_direct_children_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        backend.write(Path::new("top.txt"), b"1234").await.unwrap();
        backend.write(Path::new("sub/inner.txt"), b"12").await.unwrap();
        backend.write(Path::new("sub/deeper/leaf.txt"), b"1").await.unwrap();

        let mut names: Vec<_> = backend
            .list_dir(Path::new(""))
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.meta.kind))
            .collect();
        names.sort();
        assert_eq!(names, vec![("sub".to_string(), FileKind::Folder), ("top.txt".to_string(), FileKind::File)]);

        let sub = backend.list_dir(Path::new("sub")).await.unwrap();
        let mut names: Vec<_> = sub.iter().map(|e| e.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["deeper", "inner.txt"]);
        let inner = sub.iter().find(|e| e.name == "inner.txt").unwrap();
        assert_eq!(inner.meta.size, 2);
        assert_eq!(inner.meta.path, PathBuf::from("sub/inner.txt"));
    }

    #[tokio::test]
    async fn test_path_security() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        // Attempts to escape the root should fail
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.read(Path::new("etc/../../passwd")).await.is_err());
        assert!(backend.write(Path::new("../etc/passwd"), b"data").await.is_err());
        assert!(backend.delete(Path::new("../../file")).await.is_err());
    }
}
