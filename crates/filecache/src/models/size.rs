//! Entry size representation and the folder aggregation policy.

/// Size of a cache entry.
///
/// Folder sizes are aggregates over their children and may not have been
/// computed yet. `Unknown` replaces the `-1` sentinel of the persisted
/// encoding so the rest of the code never does arithmetic on a magic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySize {
    Known(u64),
    Unknown,
}

impl EntrySize {
    pub const ZERO: Self = Self::Known(0);

    /// Decode the persisted encoding; any negative value is the unknown
    /// sentinel.
    pub fn from_raw(raw: i64) -> Self {
        match u64::try_from(raw) {
            Ok(size) => Self::Known(size),
            Err(_) => Self::Unknown,
        }
    }

    /// Encode for persistence (`-1` = unknown).
    pub fn to_raw(self) -> i64 {
        match self {
            // Sizes past i64::MAX are not representable in the column;
            // clamping keeps them ordered above every real size.
            Self::Known(size) => i64::try_from(size).unwrap_or(i64::MAX),
            Self::Unknown => -1,
        }
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::Unknown
    }

    /// Aggregate a folder's size from its children's sizes.
    ///
    /// An empty folder is `Known(0)`, and a single unknown child poisons the
    /// whole sum: reporting unknown is always preferable to silently
    /// undercounting.
    pub fn sum(sizes: impl IntoIterator<Item = EntrySize>) -> Self {
        let mut total = 0u64;
        for size in sizes {
            match size {
                Self::Known(size) => total = total.saturating_add(size),
                Self::Unknown => return Self::Unknown,
            }
        }
        Self::Known(total)
    }
}
