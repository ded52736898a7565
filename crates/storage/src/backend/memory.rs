//! In-memory storage backend for testing.

use crate::backend::{ListingCapableBackend, StorageBackend};
use crate::error::{ErrorKind, Result};
use crate::file::{DirEntry, FileKind, FileMeta};
use crate::path::validate as validate_path;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Objects are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Like a real object
/// store it only holds file objects (folders exist implicitly as key
/// prefixes), but it can also *derive* a directory listing from its keys, so
/// it implements [`ListingCapableBackend`] and works with either scanner
/// strategy in tests.
///
/// # Examples
///
/// ```
/// use burrow_storage::backend::{MemoryBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MemoryBackend::with_files([
///     ("documents/report.txt", b"contents"),
/// ]);
/// assert!(backend.exists(Path::new("documents/report.txt")).await?);
///
/// backend.write(Path::new("notes.txt"), b"more data").await?;
/// assert!(backend.exists(Path::new("notes.txt")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MemoryBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, (UtcDateTime, Vec<u8>)>>,
}

impl MemoryBackend {
    /// Create a memory backend pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    ///
    /// # Example
    ///
    /// ```
    /// use burrow_storage::backend::MemoryBackend;
    ///
    /// let backend = MemoryBackend::with_files([
    ///     ("one.txt", b"data file 1"),
    ///     ("dir/two.txt", b"data file 2"),
    /// ]);
    /// ```
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = UtcDateTime::now();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                // The panic here is DELIBERATE. MemoryBackend is intended to
                // be used in tests; panics are expected. There is no error
                // result.
                panic!("MemoryBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "memory".to_string(),
            storage: RwLock::new(map),
        }
    }

    /// Change the name of the memory backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn file_meta(path: &Path, size: u64, inserted: UtcDateTime) -> FileMeta {
        FileMeta::new(path, size, inserted, FileKind::File)
    }
}
impl Default for MemoryBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        if path.as_os_str().is_empty() || guard.contains_key(&path) {
            return Ok(true);
        }
        // A folder exists if any object lives under it.
        Ok(guard.keys().any(|key| key != &path && key.starts_with(&path)))
    }

    async fn stat(&self, path: &Path) -> Result<FileMeta> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        if let Some((inserted, data)) = guard.get(&path) {
            return Ok(Self::file_meta(&path, data.len() as u64, *inserted));
        }
        // Synthesize folder metadata from the keys below it; the root always
        // exists even when empty.
        let newest = guard
            .iter()
            .filter(|(key, _)| key.as_path() != path && key.starts_with(&path))
            .map(|(_, (inserted, _))| *inserted)
            .max();
        match newest {
            Some(modified) => Ok(FileMeta::new(&path, 0, modified, FileKind::Folder)),
            None if path.as_os_str().is_empty() => Ok(FileMeta::new(&path, 0, UtcDateTime::UNIX_EPOCH, FileKind::Folder)),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let (_inserted, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.insert(path, (UtcDateTime::now(), data.to_vec()));
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }
}

#[async_trait]
impl ListingCapableBackend for MemoryBackend {
    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let prefix = validate_path(path)?;
        let guard = self.storage.read().await;
        let mut files: BTreeMap<String, DirEntry> = BTreeMap::new();
        let mut folders: BTreeMap<String, UtcDateTime> = BTreeMap::new();
        for (key, (inserted, data)) in guard.iter() {
            let Ok(rest) = key.strip_prefix(&prefix) else { continue };
            let mut components = rest.iter();
            let Some(first) = components.next() else { continue };
            let Some(name) = first.to_str() else { continue };
            if components.next().is_none() {
                let meta = Self::file_meta(&prefix.join(name), data.len() as u64, *inserted);
                files.insert(name.to_string(), DirEntry { name: name.to_string(), meta });
            } else {
                let newest = folders.entry(name.to_string()).or_insert(*inserted);
                *newest = (*newest).max(*inserted);
            }
        }
        let mut entries: Vec<DirEntry> = folders
            .into_iter()
            .map(|(name, modified)| DirEntry {
                meta: FileMeta::new(prefix.join(&name), 0, modified, FileKind::Folder),
                name,
            })
            .collect();
        // An object that shares its key with a folder prefix is shadowed by
        // the folder, matching hierarchical backends.
        let folder_names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        entries.extend(files.into_values().filter(|e| !folder_names.contains(&e.name.as_str())));
        Ok(entries)
    }
}
