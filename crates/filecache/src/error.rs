//! Filecache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A filecache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for filecache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Cache failures are always structural from the scanner's point of view:
/// nothing here is worth retrying, the caller has to give up and surface it.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// Serialization/deserialization error.
    #[display("invalid cache data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
