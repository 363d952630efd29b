use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::lister::DirectoryLister;
use crate::listing::{FileEntry, Listing};
use crate::watcher::event::WatchEvent;

/// Authoritative listing for one watched root.
///
/// Readers get an `Arc<Listing>` that is never mutated afterwards. Writers build
/// the next listing off to the side and swap the `Arc` in under the write lock,
/// so a reader observes either the state before a mutation or after it, never a
/// half-applied one. Rescans do their filesystem I/O with no lock held.
#[derive(Clone)]
pub struct ListingStore {
    root: Arc<PathBuf>,
    lister: DirectoryLister,
    current: Arc<RwLock<Arc<Listing>>>,
}

impl ListingStore {
    pub fn new(root: PathBuf, lister: DirectoryLister) -> Self {
        Self {
            root: Arc::new(root),
            lister,
            current: Arc::new(RwLock::new(Arc::new(Listing::new()))),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Consistent, immutable view of the current listing.
    pub async fn snapshot(&self) -> Arc<Listing> {
        Arc::clone(&*self.current.read().await)
    }

    /// Replace the listing wholesale.
    pub async fn reset(&self, listing: Listing) {
        let mut current = self.current.write().await;
        *current = Arc::new(listing);
    }

    /// Append `entry` if absent. Duplicate notifications are no-ops.
    pub async fn apply_add(&self, entry: FileEntry) -> bool {
        let mut current = self.current.write().await;
        if current.contains(entry.name()) {
            return false;
        }
        let mut next = (**current).clone();
        next.insert(entry);
        *current = Arc::new(next);
        true
    }

    /// Remove `entry` by name. Removing an absent name is a no-op.
    pub async fn apply_delete(&self, entry: &FileEntry) -> bool {
        let mut current = self.current.write().await;
        if !current.contains(entry.name()) {
            return false;
        }
        let mut next = (**current).clone();
        next.remove(entry.name());
        *current = Arc::new(next);
        true
    }

    /// Content changes don't alter the name set, but a "changed" notice can hide
    /// a rename-via-replace, so the listing is re-derived from disk.
    ///
    /// If the root cannot be read the prior listing stays in place.
    pub async fn apply_change(&self, entry: &FileEntry) -> bool {
        tracing::debug!("rescanning {} after change to {}", self.root.display(), entry.display_name());
        self.rescan().await
    }

    /// Re-derive the listing from disk. Returns whether the listing changed.
    pub async fn rescan(&self) -> bool {
        let lister = self.lister.clone();
        let root = Arc::clone(&self.root);
        let result = tokio::task::spawn_blocking(move || lister.list(&root)).await;

        let listing = match result {
            Ok(Ok(listing)) => listing,
            Ok(Err(err)) => {
                tracing::warn!("rescan failed, keeping previous listing: {err}");
                return false;
            }
            Err(err) => {
                tracing::warn!("rescan task failed, keeping previous listing: {err}");
                return false;
            }
        };

        let mut current = self.current.write().await;
        if **current == listing {
            return false;
        }
        *current = Arc::new(listing);
        true
    }

    /// Dispatch a watcher event to the matching `apply_*` operation.
    pub async fn apply(&self, event: WatchEvent) -> bool {
        match event {
            WatchEvent::Added(entry) => self.apply_add(entry).await,
            WatchEvent::Changed(entry) => self.apply_change(&entry).await,
            WatchEvent::Deleted(entry) => self.apply_delete(&entry).await,
        }
    }
}
