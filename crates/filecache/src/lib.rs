//! SQLite metadata cache for storage backends: the *filecache*.
//!
//! This crate provides the durable cache that tracks the last known state of
//! a storage backend's file tree: one record per path with size, mtime, etag
//! and permissions. The cache is not the source of truth; the backend is.
//! If the database is deleted, it can be rebuilt by scanning the backend.
//!
//! # Architecture
//! Records form a tree through their `parent` link, and a parent index makes
//! child enumeration cheap; that index is what the scanners traverse. Folder
//! sizes are aggregates over children and may be *unknown* (pending
//! recomputation); see [`EntrySize`].
//!
//! Every mutation is a single-record statement. There are no multi-record
//! transactions: concurrent writers resolve last-write-wins per record, and
//! an abandoned scan can never leave a half-written record behind.

mod db;
pub mod error;
mod models;
pub mod paths;
mod repo;

pub use crate::db::Database;
pub use crate::models::{CacheEntry, EntryKind, EntrySize, EntryUpdate};
pub use crate::models::{PERM_ALL, PERM_CREATE, PERM_DELETE, PERM_READ, PERM_WRITE};
pub use crate::repo::FileCache;
