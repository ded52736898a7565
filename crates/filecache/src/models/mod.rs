mod entry;
mod size;

pub use self::entry::{CacheEntry, EntryKind, EntryUpdate};
pub use self::entry::{PERM_ALL, PERM_CREATE, PERM_DELETE, PERM_READ, PERM_WRITE};
pub(crate) use self::entry::EntryRow;
pub use self::size::EntrySize;
