use std::ffi::{OsStr, OsString};

/// A file known to exist directly under the watched root, identified by its
/// name relative to that root. Carries no content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileEntry {
    name: OsString,
}

impl FileEntry {
    pub fn new(name: impl Into<OsString>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &OsStr {
        &self.name
    }

    /// The name as UTF-8, or `None` if it cannot be represented as text.
    pub fn as_str(&self) -> Option<&str> {
        self.name.to_str()
    }

    pub fn display_name(&self) -> String {
        self.name.to_string_lossy().into_owned()
    }
}

impl From<&str> for FileEntry {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Ordered sequence of entries with no duplicate names.
///
/// Order is significant for rendering: a fresh listing is sorted by name,
/// incremental additions are appended in the order they arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    entries: Vec<FileEntry>,
}

impl Listing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a listing sorted lexicographically by name, dropping duplicates.
    pub fn sorted(mut entries: Vec<FileEntry>) -> Self {
        entries.sort();
        entries.dedup();
        Self { entries }
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &OsStr) -> bool {
        self.entries.iter().any(|e| e.name() == name)
    }

    /// Append `entry` unless a same-named entry is already present.
    /// Returns whether the listing changed.
    pub fn insert(&mut self, entry: FileEntry) -> bool {
        if self.contains(entry.name()) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Remove the entry named `name`. Returns whether the listing changed.
    pub fn remove(&mut self, name: &OsStr) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name() != name);
        self.entries.len() != before
    }

    /// Names as lossy UTF-8, in listing order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(FileEntry::display_name).collect()
    }
}

impl FromIterator<FileEntry> for Listing {
    /// Collect in iteration order, keeping the first occurrence of each name.
    fn from_iter<I: IntoIterator<Item = FileEntry>>(iter: I) -> Self {
        let mut listing = Listing::new();
        for entry in iter {
            listing.insert(entry);
        }
        listing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_dedups_and_orders() {
        let listing = Listing::sorted(vec!["b.txt".into(), "a.txt".into(), "b.txt".into()]);
        assert_eq!(listing.names(), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_insert_appends_and_rejects_duplicates() {
        let mut listing = Listing::sorted(vec!["m.txt".into()]);
        assert!(listing.insert("a.txt".into()));
        assert!(!listing.insert("a.txt".into()));
        assert_eq!(listing.names(), vec!["m.txt", "a.txt"]);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut listing = Listing::sorted(vec!["a.txt".into()]);
        assert!(!listing.remove(OsStr::new("zzz")));
        assert!(listing.remove(OsStr::new("a.txt")));
        assert!(listing.is_empty());
    }

    #[test]
    fn test_from_iter_keeps_first_occurrence_order() {
        let listing: Listing = ["c", "a", "c", "b"].into_iter().map(FileEntry::from).collect();
        assert_eq!(listing.names(), vec!["c", "a", "b"]);
    }
}
