//! Full-listing reconciliation for backends with real directories.

use crate::Scanner;
use crate::error::{ErrorKind, Result};
use crate::meta;
use crate::sizes;
use crate::stats::ScanStats;
use async_trait::async_trait;
use burrow_filecache::{CacheEntry, EntrySize, FileCache, PERM_ALL, PERM_READ, paths};
use burrow_storage::{FileKind, FileMeta, ListingCapableBackend, ListingHandle, StorageBackend};
use exn::{OptionExt, ResultExt};
use std::collections::HashMap;
use std::path::Path;

/// Reconciles the cache against a listing-capable backend.
///
/// `scan` walks the backend's real directory tree depth-first and diffs every
/// folder's listing against the cached children: new entries are inserted,
/// changed ones updated, unlisted ones removed. Folder sizes are aggregated
/// post-order, so each folder's size is correct before its parent's is
/// computed, then the result propagates up the ancestor chain of the scan
/// root.
///
/// Concurrent scans of overlapping subtrees coordinate only through
/// last-write-wins on individual records; a pass that races an external
/// mutation may leave one subtree's size stale until the next scan.
pub struct TreeScanner {
    backend: ListingHandle,
    cache: FileCache,
    permissions: i64,
}

impl TreeScanner {
    pub fn new(backend: ListingHandle, cache: FileCache) -> Self {
        let permissions = match backend.readonly() {
            true => PERM_READ,
            false => PERM_ALL,
        };
        Self { backend, cache, permissions }
    }

    fn storage(&self) -> &str {
        self.backend.name()
    }

    /// Upsert a single cache record from backend stat metadata; returns its id.
    ///
    /// A path that switched between file and folder is a different entry: the
    /// old record (and any subtree under it) is dropped before the insert.
    async fn upsert_entry(
        &self,
        path: &str,
        stat: &FileMeta,
        cached: Option<&CacheEntry>,
        stats: &mut ScanStats,
    ) -> Result<i64> {
        let update = meta::update_for(stat, self.permissions);
        if let Some(existing) = cached {
            if existing.kind.is_dir() == stat.is_folder() {
                if existing.etag != update.etag.as_deref().unwrap_or_default() {
                    self.cache.put(self.storage(), path, &update).await.or_raise(|| ErrorKind::Cache)?;
                    stats.updated += 1;
                }
                return Ok(existing.id);
            }
            self.cache.remove(self.storage(), &existing.path).await.or_raise(|| ErrorKind::Cache)?;
            stats.removed += 1;
        }
        let id = self.cache.put(self.storage(), path, &update).await.or_raise(|| ErrorKind::Cache)?;
        stats.added += 1;
        Ok(id)
    }

    /// Depth-first reconciliation of one folder's listing against its cached
    /// children. Returns the folder's recomputed size.
    async fn scan_folder(&self, path: &str, folder_id: i64, stats: &mut ScanStats) -> Result<EntrySize> {
        let listing = match self.backend.list_dir(Path::new(path)).await {
            Ok(listing) => listing,
            Err(err) if err.is_retryable() => {
                // One unlistable folder must not abort its siblings; its
                // cached subtree is left as it stands.
                tracing::warn!(folder = path, error = %err, "transient error listing folder; skipping subtree");
                let entry = self.cache.get_by_id(folder_id).await.or_raise(|| ErrorKind::Cache)?;
                return Ok(entry.map_or(EntrySize::Unknown, |entry| entry.size));
            },
            Err(err) => return Err(err.raise(ErrorKind::Storage)),
        };

        let mut stale: HashMap<String, CacheEntry> = self
            .cache
            .children(folder_id)
            .await
            .or_raise(|| ErrorKind::Cache)?
            .into_iter()
            .map(|child| (child.name.clone(), child))
            .collect();

        let mut total = EntrySize::ZERO;
        for entry in listing {
            let child_path = paths::join(path, &entry.name);
            let cached = stale.remove(&entry.name);
            let child_size = match entry.meta.kind {
                FileKind::Folder => {
                    let id = self.upsert_entry(&child_path, &entry.meta, cached.as_ref(), stats).await?;
                    let size = Box::pin(self.scan_folder(&child_path, id, stats)).await?;
                    self.cache.update_size(id, size).await.or_raise(|| ErrorKind::Cache)?;
                    size
                },
                FileKind::File => {
                    self.upsert_entry(&child_path, &entry.meta, cached.as_ref(), stats).await?;
                    EntrySize::Known(entry.meta.size)
                },
            };
            total = EntrySize::sum([total, child_size]);
        }

        // Whatever the backend no longer lists is gone.
        for old in stale.into_values() {
            self.cache.remove(self.storage(), &old.path).await.or_raise(|| ErrorKind::Cache)?;
            stats.removed += 1;
        }
        Ok(total)
    }
}

#[async_trait]
impl Scanner for TreeScanner {
    async fn scan_file(&self, path: &str) -> Result<ScanStats> {
        let mut stats = ScanStats::default();
        let cached = self.cache.get(self.storage(), path).await.or_raise(|| ErrorKind::Cache)?;
        match self.backend.stat(Path::new(path)).await {
            Ok(file) => {
                self.upsert_entry(path, &file, cached.as_ref(), &mut stats).await?;
            },
            Err(err) => {
                meta::absent_or_raise(path, err)?;
                if self.cache.remove(self.storage(), path).await.or_raise(|| ErrorKind::Cache)? {
                    stats.removed += 1;
                }
            },
        }
        // Ancestor sizes are left to the next full or background scan; a
        // single-file pass touches exactly one record.
        tracing::debug!(storage = self.storage(), path, ?stats, "scan_file finished");
        Ok(stats)
    }

    async fn scan(&self, path: &str) -> Result<ScanStats> {
        let mut stats = ScanStats::default();
        let root = match self.backend.stat(Path::new(path)).await {
            Ok(meta) => meta,
            Err(err) => {
                meta::absent_or_raise(path, err)?;
                if let Some(entry) = self.cache.get(self.storage(), path).await.or_raise(|| ErrorKind::Cache)? {
                    self.cache.remove(self.storage(), path).await.or_raise(|| ErrorKind::Cache)?;
                    stats.removed += 1;
                    sizes::propagate_upward(&self.cache, entry.parent_id).await?;
                }
                return Ok(stats);
            },
        };
        let cached = self.cache.get(self.storage(), path).await.or_raise(|| ErrorKind::Cache)?;
        let id = self.upsert_entry(path, &root, cached.as_ref(), &mut stats).await?;
        if root.is_folder() {
            let size = self.scan_folder(path, id, &mut stats).await?;
            self.cache.update_size(id, size).await.or_raise(|| ErrorKind::Cache)?;
        }
        let entry = self
            .cache
            .get_by_id(id)
            .await
            .or_raise(|| ErrorKind::Cache)?
            .ok_or_raise(|| ErrorKind::Corrupt(format!("scanned record {id} disappeared")))?;
        sizes::propagate_upward(&self.cache, entry.parent_id).await?;
        tracing::info!(
            storage = self.storage(),
            path,
            added = stats.added,
            updated = stats.updated,
            removed = stats.removed,
            "scan finished"
        );
        Ok(stats)
    }

    async fn background_scan(&self) -> Result<ScanStats> {
        let mut stats = ScanStats::default();
        sizes::repair_unknown_sizes(self.backend.as_ref(), &self.cache, self.permissions, &mut stats).await?;
        tracing::debug!(storage = self.storage(), ?stats, "background scan finished");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_filecache::{Database, EntryKind, EntryUpdate};
    use burrow_storage::StorageBackend;
    use burrow_storage::backend::MemoryBackend;
    use std::sync::Arc;

    async fn fixture(backend: MemoryBackend) -> (TreeScanner, FileCache, ListingHandle) {
        let db = Database::connect_in_memory().await.unwrap();
        let cache = FileCache::from(&db);
        let handle: ListingHandle = Arc::new(backend);
        (TreeScanner::new(handle.clone(), cache.clone()), cache, handle)
    }

    #[tokio::test]
    async fn test_scan_inserts_whole_tree() {
        let backend = MemoryBackend::with_files([
            ("foo.txt", Vec::from(*b"dummy file data\n")),
            ("foo.png", vec![0x89, 0x50, 0x4e, 0x47]),
            ("folder/bar.txt", Vec::from(*b"dummy file data\n")),
        ]);
        let (scanner, cache, _) = fixture(backend).await;

        let stats = scanner.scan("").await.unwrap();
        // root + 2 top-level files + folder + bar.txt
        assert_eq!(stats.added, 5);

        assert_eq!(cache.get("memory", "foo.txt").await.unwrap().unwrap().size, EntrySize::Known(16));
        assert_eq!(cache.get("memory", "foo.png").await.unwrap().unwrap().size, EntrySize::Known(4));
        assert_eq!(cache.get("memory", "folder/bar.txt").await.unwrap().unwrap().size, EntrySize::Known(16));
        assert_eq!(cache.get("memory", "folder").await.unwrap().unwrap().size, EntrySize::Known(16));
        assert_eq!(cache.get("memory", "").await.unwrap().unwrap().size, EntrySize::Known(36));
    }

    #[tokio::test]
    async fn test_folder_size_is_sum_of_children() {
        let backend = MemoryBackend::with_files([
            ("docs/a.txt", Vec::from(*b"1234")),
            ("docs/b.txt", Vec::from(*b"12")),
            ("docs/nested/c.txt", Vec::from(*b"1")),
        ]);
        let (scanner, cache, _) = fixture(backend).await;
        scanner.scan("").await.unwrap();

        let docs = cache.get("memory", "docs").await.unwrap().unwrap();
        let children = cache.children(docs.id).await.unwrap();
        let expected = EntrySize::sum(children.iter().map(|child| child.size));
        assert_eq!(docs.size, expected);
        assert_eq!(docs.size, EntrySize::Known(7));
    }

    #[tokio::test]
    async fn test_scan_is_idempotent() {
        let backend = MemoryBackend::with_files([("folder/bar.txt", Vec::from(*b"foobar"))]);
        let (scanner, _, _) = fixture(backend).await;
        let first = scanner.scan("").await.unwrap();
        assert_eq!(first.added, 3);
        let second = scanner.scan("").await.unwrap();
        assert!(second.is_noop());
    }

    #[tokio::test]
    async fn test_scan_removes_vanished_entries() {
        let backend = MemoryBackend::with_files([
            ("keep.txt", Vec::from(*b"1234")),
            ("gone.txt", Vec::from(*b"123456")),
        ]);
        let (scanner, cache, handle) = fixture(backend).await;
        scanner.scan("").await.unwrap();
        assert_eq!(cache.get("memory", "").await.unwrap().unwrap().size, EntrySize::Known(10));

        handle.delete(Path::new("gone.txt")).await.unwrap();
        let stats = scanner.scan("").await.unwrap();
        assert_eq!(stats.removed, 1);
        assert!(cache.get("memory", "gone.txt").await.unwrap().is_none());
        assert_eq!(cache.get("memory", "").await.unwrap().unwrap().size, EntrySize::Known(4));
    }

    #[tokio::test]
    async fn test_scan_updates_changed_entries() {
        let backend = MemoryBackend::with_files([("file.txt", Vec::from(*b"123"))]);
        let (scanner, cache, handle) = fixture(backend).await;
        scanner.scan("").await.unwrap();
        let before = cache.get("memory", "file.txt").await.unwrap().unwrap();

        handle.write(Path::new("file.txt"), b"123456").await.unwrap();
        let stats = scanner.scan("").await.unwrap();
        // At least the file; the root folder may also re-etag.
        assert!(stats.updated >= 1);
        let after = cache.get("memory", "file.txt").await.unwrap().unwrap();
        assert_eq!(after.size, EntrySize::Known(6));
        assert_ne!(after.etag, before.etag);
        assert_eq!(cache.get("memory", "").await.unwrap().unwrap().size, EntrySize::Known(6));
    }

    #[tokio::test]
    async fn test_scan_subfolder_propagates_upward() {
        let backend = MemoryBackend::with_files([("a/b/file.txt", Vec::from(*b"12"))]);
        let (scanner, cache, handle) = fixture(backend).await;
        scanner.scan("").await.unwrap();

        handle.write(Path::new("a/b/file.txt"), b"1234567890").await.unwrap();
        scanner.scan("a/b").await.unwrap();
        assert_eq!(cache.get("memory", "a/b").await.unwrap().unwrap().size, EntrySize::Known(10));
        assert_eq!(cache.get("memory", "a").await.unwrap().unwrap().size, EntrySize::Known(10));
        assert_eq!(cache.get("memory", "").await.unwrap().unwrap().size, EntrySize::Known(10));
    }

    #[tokio::test]
    async fn test_scan_empty_root() {
        let (scanner, cache, _) = fixture(MemoryBackend::default()).await;
        scanner.scan("").await.unwrap();
        // A folder with zero children aggregates to zero, not unknown.
        assert_eq!(cache.get("memory", "").await.unwrap().unwrap().size, EntrySize::Known(0));
    }

    #[tokio::test]
    async fn test_scan_file_records_backend_size() {
        let backend = MemoryBackend::with_files([("foo.txt", Vec::from(*b"dummy file data\n"))]);
        let (scanner, cache, handle) = fixture(backend).await;
        scanner.scan_file("foo.txt").await.unwrap();
        let meta = handle.stat(Path::new("foo.txt")).await.unwrap();
        let entry = cache.get("memory", "foo.txt").await.unwrap().unwrap();
        assert_eq!(entry.size, EntrySize::Known(meta.size));
        assert_eq!(entry.kind, EntryKind::File);
    }

    #[tokio::test]
    async fn test_scan_file_creates_ancestor_placeholders() {
        let backend = MemoryBackend::with_files([("a/b/file.txt", Vec::from(*b"123"))]);
        let (scanner, cache, _) = fixture(backend).await;
        scanner.scan_file("a/b/file.txt").await.unwrap();
        // Ancestors exist as unknown-size folders awaiting background repair.
        assert_eq!(cache.get("memory", "a/b").await.unwrap().unwrap().size, EntrySize::Unknown);
        assert_eq!(cache.get("memory", "a").await.unwrap().unwrap().size, EntrySize::Unknown);
    }

    #[tokio::test]
    async fn test_scan_file_removes_missing_entry() {
        let backend = MemoryBackend::with_files([("file.txt", Vec::from(*b"123"))]);
        let (scanner, cache, handle) = fixture(backend).await;
        scanner.scan_file("file.txt").await.unwrap();
        handle.delete(Path::new("file.txt")).await.unwrap();
        let stats = scanner.scan_file("file.txt").await.unwrap();
        assert_eq!(stats.removed, 1);
        assert!(cache.get("memory", "file.txt").await.unwrap().is_none());
        // Scanning an entry that exists nowhere is not an error.
        assert!(scanner.scan_file("file.txt").await.unwrap().is_noop());
    }

    #[tokio::test]
    async fn test_path_flips_between_file_and_folder() {
        let backend = MemoryBackend::with_files([("thing", Vec::from(*b"123"))]);
        let (scanner, cache, handle) = fixture(backend).await;
        scanner.scan("").await.unwrap();
        assert_eq!(cache.get("memory", "thing").await.unwrap().unwrap().kind, EntryKind::File);

        handle.delete(Path::new("thing")).await.unwrap();
        handle.write(Path::new("thing/inner.txt"), b"123456").await.unwrap();
        let stats = scanner.scan("").await.unwrap();
        assert_eq!(stats.removed, 1);
        let thing = cache.get("memory", "thing").await.unwrap().unwrap();
        assert_eq!(thing.kind, EntryKind::Dir);
        assert_eq!(thing.size, EntrySize::Known(6));
    }

    #[tokio::test]
    async fn test_background_scan_repairs_forced_unknown() {
        let backend = MemoryBackend::with_files([
            ("foo.txt", Vec::from(*b"dummy file data\n")),
            ("folder2/bar.txt", Vec::from(*b"foobar")),
        ]);
        let (scanner, cache, _) = fixture(backend).await;
        scanner.scan("").await.unwrap();
        assert_eq!(cache.get("memory", "folder2").await.unwrap().unwrap().size, EntrySize::Known(6));

        // Force the folder size to unknown through a direct cache write.
        cache.put("memory", "folder2", &EntryUpdate::size(EntrySize::Unknown)).await.unwrap();
        assert_eq!(cache.get("memory", "folder2").await.unwrap().unwrap().size, EntrySize::Unknown);

        let stats = scanner.background_scan().await.unwrap();
        assert_eq!(stats.updated, 1);
        assert_eq!(cache.get("memory", "folder2").await.unwrap().unwrap().size, EntrySize::Known(6));

        // Idempotent: a second run has nothing left to repair.
        assert!(scanner.background_scan().await.unwrap().is_noop());
    }

    #[tokio::test]
    async fn test_background_scan_resolves_placeholder_chain() {
        let backend = MemoryBackend::with_files([("a/b/file.txt", Vec::from(*b"12345"))]);
        let (scanner, cache, _) = fixture(backend).await;
        // Only the file is known; its ancestors are unknown-size placeholders.
        scanner.scan_file("a/b/file.txt").await.unwrap();
        scanner.background_scan().await.unwrap();
        assert_eq!(cache.get("memory", "a/b").await.unwrap().unwrap().size, EntrySize::Known(5));
        assert_eq!(cache.get("memory", "a").await.unwrap().unwrap().size, EntrySize::Known(5));
        assert_eq!(cache.get("memory", "").await.unwrap().unwrap().size, EntrySize::Known(5));
    }
}
