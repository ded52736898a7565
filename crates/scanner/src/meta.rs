//! Translation from backend stat metadata to cache attributes.

use crate::error::{ErrorKind, Result};
use burrow_filecache::{EntryKind, EntrySize, EntryUpdate};
use burrow_storage::error::ErrorKind as StorageErrorKind;
use burrow_storage::{FileKind, FileMeta};

/// Derive a change-detection etag from stat metadata.
///
/// The etag must change whenever size or mtime does; content hashing is out
/// of scope, stat is all a reconciliation pass reads.
pub(crate) fn etag_for(meta: &FileMeta) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&meta.size.to_le_bytes());
    hasher.update(&meta.modified.unix_timestamp().to_le_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}

/// Build the cache attribute set a stat result translates to.
///
/// Folder sizes are aggregates over children, so a folder's backend-reported
/// size is deliberately not written: a new folder record starts with unknown
/// size and an existing one keeps whatever aggregation produced.
pub(crate) fn update_for(meta: &FileMeta, permissions: i64) -> EntryUpdate {
    EntryUpdate {
        kind: Some(match meta.kind {
            FileKind::File => EntryKind::File,
            FileKind::Folder => EntryKind::Dir,
        }),
        size: match meta.kind {
            FileKind::File => Some(EntrySize::Known(meta.size)),
            FileKind::Folder => None,
        },
        mtime: Some(meta.modified),
        etag: Some(etag_for(meta)),
        permissions: Some(permissions),
    }
}

/// Classify a failed backend call on a single entry.
///
/// Returns `Ok(())` when the entry should be treated as absent: either the
/// backend reported it missing, or the fault is transient and swallowing it
/// (with a log line) keeps the rest of the pass alive. Hard errors are
/// re-raised as fatal [`ErrorKind::Storage`].
pub(crate) fn absent_or_raise(path: &str, err: burrow_storage::error::Error) -> Result<()> {
    if matches!(&*err, StorageErrorKind::NotFound(_)) {
        return Ok(());
    }
    if err.is_retryable() {
        tracing::warn!(path, error = %err, "transient backend error; treating entry as absent");
        return Ok(());
    }
    Err(err.raise(ErrorKind::Storage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use time::UtcDateTime;

    fn meta(size: u64, mtime: i64) -> FileMeta {
        FileMeta::new("file.txt", size, UtcDateTime::from_unix_timestamp(mtime).unwrap(), FileKind::File)
    }

    #[test]
    fn test_etag_tracks_size_and_mtime() {
        let base = etag_for(&meta(6, 1_700_000_000));
        assert_eq!(base.len(), 16);
        assert_eq!(etag_for(&meta(6, 1_700_000_000)), base);
        assert_ne!(etag_for(&meta(7, 1_700_000_000)), base);
        assert_ne!(etag_for(&meta(6, 1_700_000_001)), base);
    }

    #[test]
    fn test_update_for_file_carries_size() {
        let update = update_for(&meta(6, 1_700_000_000), 1);
        assert_eq!(update.kind, Some(EntryKind::File));
        assert_eq!(update.size, Some(EntrySize::Known(6)));
        assert_eq!(update.permissions, Some(1));
    }

    #[test]
    fn test_update_for_folder_leaves_size_alone() {
        let folder = FileMeta::new("dir", 4096, UtcDateTime::from_unix_timestamp(0).unwrap(), FileKind::Folder);
        let update = update_for(&folder, 1);
        assert_eq!(update.kind, Some(EntryKind::Dir));
        assert_eq!(update.size, None);
    }

    #[test]
    fn test_absent_or_raise() {
        let not_found = exn::Exn::from(StorageErrorKind::NotFound(PathBuf::from("x")));
        assert!(absent_or_raise("x", not_found).is_ok());
        let transient = exn::Exn::from(StorageErrorKind::Network("timeout".to_string()));
        assert!(absent_or_raise("x", transient).is_ok());
        let hard = exn::Exn::from(StorageErrorKind::PermissionDenied(PathBuf::from("x")));
        let err = absent_or_raise("x", hard).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Storage));
    }
}
