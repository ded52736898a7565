//! Repository for filecache records.
//!
//! [`FileCache`] is the handle the scanners thread through every pass. It is
//! deliberately narrow: path/id lookup, child enumeration via the parent
//! index, partial-attribute upsert, subtree removal, and the unknown-size
//! work queue. Each mutation is one statement against one record.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{CacheEntry, EntryKind, EntryRow, EntrySize, EntryUpdate};
use crate::paths;
use exn::ResultExt;
use sqlx::SqlitePool;
use time::UtcDateTime;

/// Repository over the `filecache` table.
///
/// Cheap to clone; holds only a pool handle. Pass one explicitly into every
/// scanner rather than sharing process-wide state; concurrent scans then
/// coordinate exclusively through the database's record-level
/// last-write-wins semantics.
#[derive(Debug, Clone)]
pub struct FileCache {
    pool: SqlitePool,
}
impl From<&Database> for FileCache {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl FileCache {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Get the record at a storage-relative path.
    pub async fn get(&self, storage: &str, path: &str) -> Result<Option<CacheEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../queries/get_by_path.sql"))
            .bind(storage)
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(CacheEntry::try_from).transpose()
    }

    /// Get a record by its id.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<CacheEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../queries/get_by_id.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(CacheEntry::try_from).transpose()
    }

    /// List the direct children of a folder record, ordered by name.
    pub async fn children(&self, parent_id: i64) -> Result<Vec<CacheEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(include_str!("../queries/children.sql"))
            .bind(parent_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(CacheEntry::try_from).collect()
    }

    /// Pop the next entry whose size is unknown, deepest path first.
    ///
    /// Deepest-first ordering means every descendant of a folder comes off
    /// the queue before the folder itself, so a folder's children all have
    /// known sizes by the time it is recomputed.
    pub async fn next_unknown(&self, storage: &str) -> Result<Option<CacheEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../queries/next_unknown.sql"))
            .bind(storage)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(CacheEntry::try_from).transpose()
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Upsert: merge a partial attribute set into the record at `path`,
    /// creating it (and any missing ancestor folders) if necessary.
    ///
    /// Auto-created ancestors are folders with unknown size, which queues
    /// them for background repair. Creating ancestors at the only write
    /// point is what keeps the parent-link invariant unbreakable.
    ///
    /// Returns the record id.
    pub async fn put(&self, storage: &str, path: &str, update: &EntryUpdate) -> Result<i64> {
        if let Some(mut entry) = self.get(storage, path).await? {
            entry.apply(update);
            self.write_attributes(&entry).await?;
            return Ok(entry.id);
        }
        let parent = match paths::parent_path(path) {
            None => None,
            Some(folder) => Some(self.ensure_folder_chain(storage, folder).await?),
        };
        self.insert(storage, path, parent, update).await
    }

    /// Single-record size write used by the aggregation loops.
    pub async fn update_size(&self, id: i64, size: EntrySize) -> Result<()> {
        sqlx::query(include_str!("../queries/update_size.sql"))
            .bind(size.to_raw())
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Remove the record at `path`; for a folder record the entire cached
    /// subtree goes with it. Returns whether a record existed.
    pub async fn remove(&self, storage: &str, path: &str) -> Result<bool> {
        let Some(entry) = self.get(storage, path).await? else {
            return Ok(false);
        };
        sqlx::query(include_str!("../queries/delete_entry.sql"))
            .bind(entry.id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(storage, path, "removed cache record");
        Ok(true)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Walk the ancestor chain root-down, creating missing folders, and
    /// return the id of `folder` itself.
    async fn ensure_folder_chain(&self, storage: &str, folder: &str) -> Result<i64> {
        let mut chain: Vec<&str> = paths::ancestors(folder).collect();
        chain.push(folder);
        // `ancestors("")` already yields the root itself.
        chain.dedup();
        let mut parent: Option<i64> = None;
        for ancestor in chain {
            let id = match self.get(storage, ancestor).await? {
                Some(entry) => entry.id,
                None => self.insert(storage, ancestor, parent, &EntryUpdate::folder_placeholder()).await?,
            };
            parent = Some(id);
        }
        // The chain always has at least one element.
        parent.ok_or_else(|| exn::Exn::from(ErrorKind::InvalidData("empty ancestor chain")))
    }

    async fn insert(&self, storage: &str, path: &str, parent: Option<i64>, update: &EntryUpdate) -> Result<i64> {
        let kind = update.kind.unwrap_or(EntryKind::File);
        let size = update.size.unwrap_or(EntrySize::Unknown);
        let mtime = update.mtime.unwrap_or(UtcDateTime::UNIX_EPOCH);
        let etag = update.etag.clone().unwrap_or_default();
        let permissions = update.permissions.unwrap_or(0);
        let result = sqlx::query(include_str!("../queries/insert_entry.sql"))
            .bind(storage)
            .bind(path)
            .bind(paths::entry_name(path))
            .bind(parent)
            .bind(kind.as_str())
            .bind(size.to_raw())
            .bind(mtime.unix_timestamp())
            .bind(etag)
            .bind(permissions)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.last_insert_rowid())
    }

    async fn write_attributes(&self, entry: &CacheEntry) -> Result<()> {
        sqlx::query(include_str!("../queries/update_entry.sql"))
            .bind(entry.kind.as_str())
            .bind(entry.size.to_raw())
            .bind(entry.mtime.unix_timestamp())
            .bind(&entry.etag)
            .bind(entry.permissions)
            .bind(entry.id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}
