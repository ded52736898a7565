//! Reconciliation engine between storage backends and the filecache.
//!
//! A *scan* reconciles the cached metadata tree against the actual state of
//! a storage backend: sizes, mtimes, etags and existence. Two strategies
//! exist, selected once when the scanner is constructed:
//!
//! - [`TreeScanner`] for backends with real directory listing: walks the
//!   backend tree depth-first and diffs it against the cache.
//! - [`ObjectScanner`] for object stores, where listing is expensive or
//!   weakly consistent: reconciles single objects by stat and repairs
//!   folder sizes lazily from the cache.
//!
//! A scan invocation is internally sequential; concurrency only arises from
//! independent callers sharing one cache, coordinated by last-write-wins at
//! the record level. A caller that abandons a scan mid-pass leaves every
//! individual record consistent; there are no multi-record transactions to
//! tear.

pub mod error;
mod meta;
mod object;
mod sizes;
mod stats;
mod tree;

pub use crate::object::ObjectScanner;
pub use crate::stats::ScanStats;
pub use crate::tree::TreeScanner;

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use burrow_config::StorageConfig;
use burrow_filecache::FileCache;
use burrow_storage::ListingCapableBackend;
use burrow_storage::backend::{LocalBackend, ReadOnlyBackend};
use exn::ResultExt;
use std::sync::Arc;

/// A reconciliation strategy over one storage backend and one cache handle.
///
/// All operations return the counts of cache mutations they performed.
/// Transient faults on single entries are logged and absorbed; hard backend
/// failures and any cache failure propagate.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Reconcile the single entry at `path` against the backend. Never
    /// touches children.
    async fn scan_file(&self, path: &str) -> Result<ScanStats>;

    /// Reconcile `path` and its subtree. How much of the subtree is visible
    /// depends on the strategy: the full listing for tree scanners, the
    /// cache-known descendants for object scanners.
    async fn scan(&self, path: &str) -> Result<ScanStats>;

    /// Lazily repair entries whose size is unknown, recomputing bottom-up
    /// and propagating upward until nothing under this storage reports an
    /// unknown size. Bounded by the existing tree; discovers nothing new.
    async fn background_scan(&self) -> Result<ScanStats>;
}

/// Build the scanner strategy matching a configured backend.
///
/// Capability selection happens here, once, at construction: listing-capable
/// backends get [`TreeScanner`], object stores get [`ObjectScanner`]. Nothing
/// probes backend capabilities at call time.
pub fn for_config(storage: &StorageConfig, readonly: bool, cache: FileCache) -> Result<Box<dyn Scanner>> {
    match storage {
        StorageConfig::Local { name, root } => {
            let backend = LocalBackend::new(name.as_str(), root).or_raise(|| ErrorKind::Storage)?;
            Ok(over_listing(backend, readonly, cache))
        },
        #[cfg(feature = "s3")]
        StorageConfig::S3 {
            name,
            bucket,
            prefix,
            region,
            endpoint,
            key_id,
            key_secret,
        } => {
            let backend = burrow_storage::backend::S3Backend::new(
                name.as_str(),
                bucket.as_str(),
                prefix.clone(),
                region.as_str(),
                endpoint.clone(),
                key_id.as_str(),
                key_secret.as_str(),
            )
            .or_raise(|| ErrorKind::Storage)?;
            Ok(match readonly {
                true => Box::new(ObjectScanner::new(Arc::new(ReadOnlyBackend::new(backend)), cache)),
                false => Box::new(ObjectScanner::new(Arc::new(backend), cache)),
            })
        },
        #[cfg(not(feature = "s3"))]
        StorageConfig::S3 { .. } => exn::bail!(ErrorKind::UnsupportedBackend("s3")),
    }
}

fn over_listing<B: ListingCapableBackend + 'static>(backend: B, readonly: bool, cache: FileCache) -> Box<dyn Scanner> {
    match readonly {
        true => Box::new(TreeScanner::new(Arc::new(ReadOnlyBackend::new(backend)), cache)),
        false => Box::new(TreeScanner::new(Arc::new(backend), cache)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_filecache::Database;

    #[tokio::test]
    async fn test_for_config_builds_tree_scanner_for_local() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("file.txt"), b"1234").unwrap();
        let config = StorageConfig::Local {
            name: "local".to_string(),
            root: temp_dir.path().to_path_buf(),
        };
        let db = Database::connect_in_memory().await.unwrap();
        let cache = FileCache::from(&db);

        let scanner = for_config(&config, false, cache.clone()).unwrap();
        let stats = scanner.scan("").await.unwrap();
        // root + file.txt
        assert_eq!(stats.added, 2);
        let entry = cache.get("local", "file.txt").await.unwrap().unwrap();
        assert_eq!(entry.size, burrow_filecache::EntrySize::Known(4));
    }

    #[tokio::test]
    async fn test_for_config_readonly_marks_permissions() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("file.txt"), b"1234").unwrap();
        let config = StorageConfig::Local {
            name: "local".to_string(),
            root: temp_dir.path().to_path_buf(),
        };
        let db = Database::connect_in_memory().await.unwrap();
        let cache = FileCache::from(&db);

        let scanner = for_config(&config, true, cache.clone()).unwrap();
        scanner.scan("").await.unwrap();
        let entry = cache.get("local", "file.txt").await.unwrap().unwrap();
        assert_eq!(entry.permissions, burrow_filecache::PERM_READ);
    }
}
