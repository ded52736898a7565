//! Path conventions for cache records.
//!
//! Cache paths are storage-relative, `/`-separated, with no leading or
//! trailing slash. The empty string is the storage root.

/// The final component of a cache path (the root's name is the empty string).
pub fn entry_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// The parent path, or `None` for the root (which has no parent).
///
/// Top-level entries have the root (`""`) as their parent.
pub fn parent_path(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map_or("", |(parent, _)| parent))
}

/// Join a parent path and an entry name.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Every ancestor path from the root (`""`) down to the direct parent,
/// in creation order. The path itself is not included (except that the
/// root is its own first ancestor).
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::once("").chain(path.char_indices().filter(|(_, c)| *c == '/').map(|(i, _)| &path[..i]))
}
