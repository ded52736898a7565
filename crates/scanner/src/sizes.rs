//! Folder-size aggregation and upward propagation.
//!
//! Shared by both scanner strategies: the sum-of-children policy lives in
//! [`EntrySize::sum`], this module applies it against the cache and walks it
//! up the tree.

use crate::error::{ErrorKind, Result};
use crate::meta;
use crate::stats::ScanStats;
use burrow_filecache::{EntrySize, FileCache};
use burrow_storage::StorageBackend;
use exn::{OptionExt, ResultExt};
use std::path::Path;

/// Recompute a folder's size from its direct children's cached sizes.
pub(crate) async fn computed_folder_size(cache: &FileCache, folder_id: i64) -> Result<EntrySize> {
    let children = cache.children(folder_id).await.or_raise(|| ErrorKind::Cache)?;
    Ok(EntrySize::sum(children.iter().map(|child| child.size)))
}

/// Walk the parent chain upward, recomputing each ancestor as the sum of its
/// children, and stop the moment a recomputed size equals the stored one.
///
/// The cutoff assumes no sibling's size changed without its ancestors being
/// marked unknown; every write path in this crate maintains that, so a stable
/// ancestor means everything above it is stable too.
pub(crate) async fn propagate_upward(cache: &FileCache, mut parent_id: Option<i64>) -> Result<()> {
    while let Some(id) = parent_id {
        let entry = cache
            .get_by_id(id)
            .await
            .or_raise(|| ErrorKind::Cache)?
            .ok_or_raise(|| ErrorKind::Corrupt(format!("missing parent record {id}")))?;
        let computed = computed_folder_size(cache, id).await?;
        if computed == entry.size {
            break;
        }
        cache.update_size(id, computed).await.or_raise(|| ErrorKind::Cache)?;
        tracing::debug!(path = %entry.path, size = computed.to_raw(), "propagated folder size");
        parent_id = entry.parent_id;
    }
    Ok(())
}

/// Lazy repair: drain the unknown-size queue until nothing under the storage
/// reports an unknown size.
///
/// Folder entries are recomputed from their children, file entries (which can
/// only reach the queue through a direct cache write) are re-stated against
/// the backend. The queue is deepest-first, so by the time a folder comes up
/// every one of its descendants has been resolved. The pass is bounded by
/// the existing tree and never discovers new children.
pub(crate) async fn repair_unknown_sizes(
    backend: &dyn StorageBackend,
    cache: &FileCache,
    permissions: i64,
    stats: &mut ScanStats,
) -> Result<()> {
    let storage = backend.name();
    while let Some(entry) = cache.next_unknown(storage).await.or_raise(|| ErrorKind::Cache)? {
        if entry.kind.is_dir() {
            let computed = computed_folder_size(cache, entry.id).await?;
            if computed.is_unknown() {
                // Would loop forever: deepest-first ordering guarantees the
                // children were repaired before their folder came up.
                exn::bail!(ErrorKind::Corrupt(format!("folder `{}` still has unknown children after repair", entry.path)));
            }
            cache.update_size(entry.id, computed).await.or_raise(|| ErrorKind::Cache)?;
            stats.updated += 1;
        } else {
            match backend.stat(Path::new(&entry.path)).await {
                Ok(file) => {
                    let update = meta::update_for(&file, permissions);
                    cache.put(storage, &entry.path, &update).await.or_raise(|| ErrorKind::Cache)?;
                    stats.updated += 1;
                },
                Err(err) => {
                    meta::absent_or_raise(&entry.path, err)?;
                    if cache.remove(storage, &entry.path).await.or_raise(|| ErrorKind::Cache)? {
                        stats.removed += 1;
                    }
                },
            }
        }
        propagate_upward(cache, entry.parent_id).await?;
    }
    Ok(())
}
