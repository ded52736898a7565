use crate::error::{Error, ErrorKind};
use crate::models::size::EntrySize;
use exn::ResultExt;
use time::UtcDateTime;

/// Permission bits recorded on cache entries. Stored, not enforced; the HTTP
/// and sharing layers interpret them.
pub const PERM_READ: i64 = 1;
pub const PERM_WRITE: i64 = 2;
pub const PERM_CREATE: i64 = 4;
pub const PERM_DELETE: i64 = 8;
pub const PERM_ALL: i64 = PERM_READ | PERM_WRITE | PERM_CREATE | PERM_DELETE;

/// File or folder, as recorded in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Dir => "dir",
        }
    }

    fn parse(value: &str) -> Result<Self, Error> {
        match value {
            "file" => Ok(EntryKind::File),
            "dir" => Ok(EntryKind::Dir),
            _ => Err(exn::Exn::from(ErrorKind::InvalidData("entry kind"))),
        }
    }

    pub fn is_dir(&self) -> bool {
        *self == EntryKind::Dir
    }
}

/// One record of the filecache: the cached metadata for a single path.
///
/// Records are owned by the cache; scanners hold them only transiently during
/// a pass. Every non-root record points at an existing parent record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub id: i64,
    pub storage: String,
    pub path: String,
    /// Final path component; empty for the root.
    pub name: String,
    /// `None` only for the storage root.
    pub parent_id: Option<i64>,
    pub kind: EntryKind,
    pub size: EntrySize,
    pub mtime: UtcDateTime,
    pub etag: String,
    pub permissions: i64,
}

impl CacheEntry {
    /// Merge a partial attribute set into this record.
    pub(crate) fn apply(&mut self, update: &EntryUpdate) {
        if let Some(kind) = update.kind {
            self.kind = kind;
        }
        if let Some(size) = update.size {
            self.size = size;
        }
        if let Some(mtime) = update.mtime {
            self.mtime = mtime;
        }
        if let Some(etag) = &update.etag {
            self.etag = etag.clone();
        }
        if let Some(permissions) = update.permissions {
            self.permissions = permissions;
        }
    }
}

/// Partial attribute set merged into a record by [`FileCache::put`](crate::FileCache::put).
///
/// Unset fields keep their current value when the record exists, and fall
/// back to the record defaults on insert (kind `file`, unknown size, epoch
/// mtime, empty etag, no permissions).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryUpdate {
    pub kind: Option<EntryKind>,
    pub size: Option<EntrySize>,
    pub mtime: Option<UtcDateTime>,
    pub etag: Option<String>,
    pub permissions: Option<i64>,
}

impl EntryUpdate {
    /// Placeholder for a folder whose contents haven't been reconciled yet.
    /// The unknown size queues it for background repair.
    pub fn folder_placeholder() -> Self {
        Self {
            kind: Some(EntryKind::Dir),
            size: Some(EntrySize::Unknown),
            ..Self::default()
        }
    }

    /// A size-only update.
    pub fn size(size: EntrySize) -> Self {
        Self { size: Some(size), ..Self::default() }
    }
}

/// Database row mirror of [`CacheEntry`].
#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub(crate) id: i64,
    pub(crate) storage: String,
    pub(crate) path: String,
    pub(crate) name: String,
    pub(crate) parent: Option<i64>,
    pub(crate) kind: String,
    pub(crate) size: i64,
    pub(crate) mtime: i64,
    pub(crate) etag: String,
    pub(crate) permissions: i64,
}

impl TryFrom<EntryRow> for CacheEntry {
    type Error = Error;
    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            storage: row.storage,
            path: row.path,
            name: row.name,
            parent_id: row.parent,
            kind: EntryKind::parse(&row.kind)?,
            size: EntrySize::from_raw(row.size),
            mtime: UtcDateTime::from_unix_timestamp(row.mtime).or_raise(|| ErrorKind::InvalidData("mtime"))?,
            etag: row.etag,
            permissions: row.permissions,
        })
    }
}
