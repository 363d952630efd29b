use std::ffi::OsStr;
use std::path::Path;

use crate::config::ServeConfig;
use crate::error::{Result, ServeError};
use crate::listing::{FileEntry, Listing};

/// Decides which directory entries belong in a listing.
///
/// Shared by full listings and watcher event classification so the two agree.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    show_hidden: bool,
    exclude: Vec<glob::Pattern>,
}

impl EntryFilter {
    /// A filter that admits every entry.
    pub fn all() -> Self {
        Self {
            show_hidden: true,
            exclude: Vec::new(),
        }
    }

    pub fn from_config(config: &ServeConfig) -> Self {
        let exclude = config
            .exclude
            .iter()
            .filter_map(|pattern| match glob::Pattern::new(pattern) {
                Ok(p) => Some(p),
                Err(err) => {
                    tracing::warn!("ignoring invalid exclude pattern {pattern:?}: {err}");
                    None
                }
            })
            .collect();
        Self {
            show_hidden: config.show_hidden,
            exclude,
        }
    }

    pub fn admits(&self, name: &OsStr) -> bool {
        let name = name.to_string_lossy();
        if !self.show_hidden && name.starts_with('.') {
            return false;
        }
        !self.exclude.iter().any(|p| p.matches(&name))
    }
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Produces sorted snapshots of the immediate children of a directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryLister {
    filter: EntryFilter,
}

impl DirectoryLister {
    pub fn new(filter: EntryFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> &EntryFilter {
        &self.filter
    }

    /// List the immediate children of `dir`, sorted lexicographically by name.
    ///
    /// Fails with `ServeError::Access` if the directory cannot be read. An entry
    /// that vanishes mid-read is skipped rather than failing the whole listing.
    pub fn list(&self, dir: &Path) -> Result<Listing> {
        let read_dir = std::fs::read_dir(dir).map_err(|e| ServeError::access(dir, e))?;

        let mut entries = Vec::new();
        for result in read_dir {
            let entry = match result {
                Ok(e) => e,
                Err(err) => {
                    tracing::debug!("skipping unreadable entry in {}: {err}", dir.display());
                    continue;
                }
            };
            let name = entry.file_name();
            if self.filter.admits(&name) {
                entries.push(FileEntry::new(name));
            }
        }

        Ok(Listing::sorted(entries))
    }
}
