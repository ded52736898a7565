//! Listing-avoidant reconciliation for object-store backends.

use crate::Scanner;
use crate::error::{ErrorKind, Result};
use crate::meta;
use crate::sizes;
use crate::stats::ScanStats;
use async_trait::async_trait;
use burrow_filecache::{CacheEntry, EntrySize, FileCache, PERM_ALL, PERM_READ};
use burrow_storage::{BackendHandle, StorageBackend};
use exn::{OptionExt, ResultExt};
use std::path::Path;

/// Reconciles the cache against a backend whose listing is unreliable or
/// expensive. It never asks the backend to enumerate anything.
///
/// `scan_file` is a stat-only check on one object followed by a walk up the
/// parent chain, recomputing each ancestor as sum-of-children and stopping as
/// soon as a recomputed size matches the stored one. `scan` is a best-effort
/// pass bounded by what the cache already knows: objects created in the
/// backend outside the application's write path stay invisible until an
/// explicit reindex registers them. The primary repair mechanism is
/// `background_scan`: marking a folder's size unknown and letting the lazy
/// pass fix it costs nothing up front.
pub struct ObjectScanner {
    backend: BackendHandle,
    cache: FileCache,
    permissions: i64,
}

impl ObjectScanner {
    pub fn new(backend: BackendHandle, cache: FileCache) -> Self {
        let permissions = match backend.readonly() {
            true => PERM_READ,
            false => PERM_ALL,
        };
        Self { backend, cache, permissions }
    }

    fn storage(&self) -> &str {
        self.backend.name()
    }

    /// Stat-only reconcile of a single entry against the backend.
    ///
    /// Returns the parent id to start upward propagation from, if the entry
    /// exists (or existed) in the cache.
    async fn reconcile_entry(&self, path: &str, stats: &mut ScanStats) -> Result<Option<i64>> {
        let cached = self.cache.get(self.storage(), path).await.or_raise(|| ErrorKind::Cache)?;
        // Folder records have no backing object in an object store; the
        // cache is their only substrate, so recompute from children.
        if let Some(entry) = &cached
            && entry.kind.is_dir()
        {
            let computed = sizes::computed_folder_size(&self.cache, entry.id).await?;
            if computed != entry.size {
                self.cache.update_size(entry.id, computed).await.or_raise(|| ErrorKind::Cache)?;
                stats.updated += 1;
            }
            return Ok(entry.parent_id);
        }
        match self.backend.stat(Path::new(path)).await {
            Ok(object) => {
                let update = meta::update_for(&object, self.permissions);
                match &cached {
                    Some(existing) => {
                        if existing.etag != update.etag.as_deref().unwrap_or_default() {
                            self.cache.put(self.storage(), path, &update).await.or_raise(|| ErrorKind::Cache)?;
                            stats.updated += 1;
                        }
                        Ok(existing.parent_id)
                    },
                    None => {
                        let id = self.cache.put(self.storage(), path, &update).await.or_raise(|| ErrorKind::Cache)?;
                        stats.added += 1;
                        let entry = self
                            .cache
                            .get_by_id(id)
                            .await
                            .or_raise(|| ErrorKind::Cache)?
                            .ok_or_raise(|| ErrorKind::Corrupt(format!("inserted record {id} disappeared")))?;
                        Ok(entry.parent_id)
                    },
                }
            },
            Err(err) => {
                meta::absent_or_raise(path, err)?;
                match cached {
                    Some(existing) => {
                        self.cache.remove(self.storage(), path).await.or_raise(|| ErrorKind::Cache)?;
                        stats.removed += 1;
                        Ok(existing.parent_id)
                    },
                    None => Ok(None),
                }
            },
        }
    }

    /// Re-stat one cache-known file; returns its contribution to the parent
    /// folder's size, or `None` if the entry is gone.
    async fn reconcile_known_file(&self, child: &CacheEntry, stats: &mut ScanStats) -> Result<Option<u64>> {
        match self.backend.stat(Path::new(&child.path)).await {
            Ok(object) => {
                let update = meta::update_for(&object, self.permissions);
                if child.etag != update.etag.as_deref().unwrap_or_default() {
                    self.cache.put(self.storage(), &child.path, &update).await.or_raise(|| ErrorKind::Cache)?;
                    stats.updated += 1;
                }
                Ok(Some(object.size))
            },
            Err(err) => {
                meta::absent_or_raise(&child.path, err)?;
                if self.cache.remove(self.storage(), &child.path).await.or_raise(|| ErrorKind::Cache)? {
                    stats.removed += 1;
                }
                Ok(None)
            },
        }
    }

    /// Post-order pass over the cache-known subtree of a folder record.
    /// Returns the folder's recomputed size.
    async fn scan_known_folder(&self, folder: &CacheEntry, stats: &mut ScanStats) -> Result<EntrySize> {
        let children = self.cache.children(folder.id).await.or_raise(|| ErrorKind::Cache)?;
        let mut total = EntrySize::ZERO;
        for child in children {
            let contribution = match child.kind.is_dir() {
                true => Some(Box::pin(self.scan_known_folder(&child, stats)).await?),
                false => self.reconcile_known_file(&child, stats).await?.map(EntrySize::Known),
            };
            if let Some(size) = contribution {
                total = EntrySize::sum([total, size]);
            }
        }
        if total != folder.size {
            self.cache.update_size(folder.id, total).await.or_raise(|| ErrorKind::Cache)?;
            stats.updated += 1;
        }
        Ok(total)
    }
}

#[async_trait]
impl Scanner for ObjectScanner {
    async fn scan_file(&self, path: &str) -> Result<ScanStats> {
        let mut stats = ScanStats::default();
        let parent = self.reconcile_entry(path, &mut stats).await?;
        // Push the size delta up the parent chain; the walk cuts off at the
        // first ancestor whose recomputed size already matches.
        sizes::propagate_upward(&self.cache, parent).await?;
        tracing::debug!(storage = self.storage(), path, ?stats, "scan_file finished");
        Ok(stats)
    }

    async fn scan(&self, path: &str) -> Result<ScanStats> {
        let mut stats = ScanStats::default();
        let Some(root) = self.cache.get(self.storage(), path).await.or_raise(|| ErrorKind::Cache)? else {
            // Without listing there is nothing to discover below an
            // unindexed path.
            tracing::debug!(storage = self.storage(), path, "path not present in cache; nothing to scan");
            return Ok(stats);
        };
        match root.kind.is_dir() {
            true => {
                self.scan_known_folder(&root, &mut stats).await?;
            },
            false => {
                self.reconcile_entry(path, &mut stats).await?;
            },
        }
        sizes::propagate_upward(&self.cache, root.parent_id).await?;
        tracing::info!(
            storage = self.storage(),
            path,
            added = stats.added,
            updated = stats.updated,
            removed = stats.removed,
            "cache-bounded scan finished"
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
