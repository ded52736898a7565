//! Scanner Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Only *fatal* conditions surface here. A transient fault on a single entry
//! is logged and absorbed inside the scan loop; one bad object must never
//! abort reconciliation of its siblings.

use derive_more::{Display, Error};

/// A scanner error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The backend failed in a way that aborts the whole pass (e.g. storage
    /// unavailable), as opposed to a per-entry fault.
    #[display("storage backend failure during scan")]
    Storage,
    /// The metadata cache failed; always structural, never retried mid-pass.
    #[display("metadata cache failure during scan")]
    Cache,
    /// The cache violates one of its own invariants (e.g. a missing parent
    /// record).
    #[display("metadata cache is inconsistent: {_0}")]
    Corrupt(#[error(not(source))] String),
    /// The configured backend type was not compiled into this build.
    #[display("backend type `{_0}` is not enabled in this build")]
    UnsupportedBackend(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}
