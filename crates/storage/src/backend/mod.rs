//! Storage backend traits and implementations.
//!
//! This module defines the two backend capability levels the scanner engine
//! is built against: [`StorageBackend`] for key-based object access, and
//! [`ListingCapableBackend`] for backends that can also enumerate real
//! directories. Which one a driver implements is decided when the backend is
//! constructed; callers never probe capabilities at call time, they pick the
//! scanner strategy matching the handle they hold.

mod local;
#[cfg(feature = "mock")]
mod memory;
mod ro;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::memory::MemoryBackend;
pub use self::ro::ReadOnlyBackend;
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::error::Result;
use crate::file::{DirEntry, FileMeta};
use async_trait::async_trait;
use std::path::Path;

/// Unified interface for storage backends.
///
/// All storage operations are asynchronous to efficiently handle network
/// operations and concurrent access. The trait covers the operations every
/// driver can support: existence checks, stat metadata and content access by
/// key. Directory enumeration is deliberately *not* part of this trait;
/// see [`ListingCapableBackend`].
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations should
/// enforce this validation. The empty path denotes the storage root.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use burrow_storage::{backend::StorageBackend, error::Result};
///
/// async fn size_if_present(backend: &dyn StorageBackend, path: &Path) -> Result<Option<u64>> {
///     if backend.exists(path).await? {
///         let meta = backend.stat(path).await?;
///         Ok(Some(meta.size))
///     } else {
///         Ok(None)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (name taken from the configuration
    /// object key). Doubles as the storage identifier under which cache
    /// records are filed, so it should be stable across restarts.
    fn name(&self) -> &str;

    /// Whether write operations are disabled for this backend.
    ///
    /// The scanner records this as the permission set on cache entries;
    /// nothing in this crate enforces it beyond [`ReadOnlyBackend`].
    fn readonly(&self) -> bool {
        false
    }

    /// Check if an entry exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the entry
    /// does not exist.
    async fn stat(&self, path: &Path) -> Result<FileMeta>;

    /// Read file contents.
    ///
    /// Returns the complete file contents as a [`Vec<u8>`].
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents.
    ///
    /// Creates a new file or overwrites an existing file with the provided
    /// data. Implementations should create parent directories as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Local-disk drivers return [`NotFound`](crate::error::ErrorKind::NotFound)
    /// if the file does not exist; object stores may report success for
    /// missing keys (deletes are idempotent there).
    async fn delete(&self, path: &Path) -> Result<()>;
}

/// Backends that can enumerate the direct children of a folder.
///
/// Object stores make prefix listing expensive or weakly consistent, so this
/// capability is split out of [`StorageBackend`]: the full-tree scanner is
/// only constructible over a listing-capable handle, and listing-avoidant
/// drivers can never be asked to list at runtime.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// # use burrow_storage::{backend::ListingCapableBackend, error::Result};
/// # async fn example(backend: &dyn ListingCapableBackend) -> Result<()> {
/// for entry in backend.list_dir(Path::new("documents")).await? {
///     println!("{}: {} bytes", entry.name, entry.meta.size);
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ListingCapableBackend: StorageBackend {
    /// List the direct children of a folder with their stat metadata.
    ///
    /// Listing a folder that does not exist yields an empty vec rather than
    /// an error, to stay consistent with prefix semantics on object stores.
    /// Order is unspecified.
    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;
}
