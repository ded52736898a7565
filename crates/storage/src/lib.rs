pub mod backend;
pub mod error;
pub mod file;
mod path;

pub use crate::backend::{ListingCapableBackend, StorageBackend};
pub use crate::file::{DirEntry, FileKind, FileMeta};
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend>;
pub type ListingHandle = Arc<dyn ListingCapableBackend>;
