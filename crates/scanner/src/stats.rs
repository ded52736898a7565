//! Scan outcome counts.

use derive_more::{Add, AddAssign};

/// Counts of cache mutations performed by a scan operation.
///
/// Purely observational: scans log these on completion and tests assert on
/// them. There is no persistent identity; two runs that do the same work
/// produce equal stats.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Add, AddAssign)]
pub struct ScanStats {
    /// Records inserted
    pub added: u64,
    /// Records whose attributes or size changed
    pub updated: u64,
    /// Records removed (a removed folder counts once, not per descendant)
    pub removed: u64,
}

impl ScanStats {
    /// `true` when the operation changed nothing, the idempotence signal
    /// for repeated background scans.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}
