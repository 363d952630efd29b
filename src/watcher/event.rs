use crate::listing::FileEntry;

/// A classified change to an immediate child of the watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// An entry appeared (created, or renamed into the root).
    Added(FileEntry),
    /// An entry's content or metadata changed.
    Changed(FileEntry),
    /// An entry disappeared (removed, or renamed away).
    Deleted(FileEntry),
}

impl WatchEvent {
    pub fn entry(&self) -> &FileEntry {
        match self {
            Self::Added(e) | Self::Changed(e) | Self::Deleted(e) => e,
        }
    }

    /// Short status line, e.g. `New: a.txt`.
    pub fn describe(&self) -> String {
        let label = match self {
            Self::Added(_) => "New",
            Self::Changed(_) => "Mod",
            Self::Deleted(_) => "Del",
        };
        format!("{label}: {}", self.entry().display_name())
    }
}
