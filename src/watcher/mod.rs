pub mod event;

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, ServeError};
use crate::lister::EntryFilter;
use crate::listing::FileEntry;

use event::WatchEvent;

/// Item yielded by the watcher channel. An `Err` is always the last item: the
/// stream cannot be restarted once it ends.
pub type WatchMessage = Result<WatchEvent>;

/// Capacity of the channel between the notify callback thread and the consumer.
const CHANNEL_CAPACITY: usize = 256;

type EventSender = std::sync::mpsc::Sender<notify::Result<notify::Event>>;

/// Handle to a running watcher. Keeps the notify watcher alive (dropping stops watching).
pub struct WatcherHandle {
    watcher: RecommendedWatcher,
    /// The only sender into the bridge. The notify callback borrows it; notify
    /// drops the callback itself on its own thread, some time after the watcher.
    sender: Arc<Mutex<Option<EventSender>>>,
    /// The bridge task forwarding events from std channel to tokio channel.
    bridge_task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Stop watching and wait for the bridge to exit.
    ///
    /// Taking the sender closes the std channel right away, so the bridge ends
    /// after forwarding what is already queued. A `spawn_blocking` task cannot
    /// be aborted, which is why the channel has to close from this side.
    pub async fn stop(self) {
        let Self {
            watcher,
            sender,
            bridge_task,
        } = self;
        drop(watcher);
        let taken = match sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(taken);
        if let Err(err) = bridge_task.await {
            tracing::warn!("watcher bridge task ended abnormally: {err}");
        }
    }
}

/// Start a non-recursive watcher on `root`.
///
/// Returns a `WatcherHandle` (must be kept alive) and a tokio mpsc receiver
/// that yields classified `WatchEvent`s for immediate children of `root` that
/// pass `filter`. Fails with `ServeError::Access` if `root` cannot be watched.
pub fn start_watcher(
    root: &Path,
    filter: EntryFilter,
) -> Result<(WatcherHandle, tokio_mpsc::Receiver<WatchMessage>)> {
    let (std_tx, std_rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();
    let sender = Arc::new(Mutex::new(Some(std_tx)));

    let callback_sender = Arc::clone(&sender);
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(guard) = callback_sender.lock()
            && let Some(tx) = guard.as_ref()
        {
            let _ = tx.send(res);
        }
    })
    .map_err(|e| ServeError::access(root, notify_to_io(e)))?;
    watcher
        .watch(root, RecursiveMode::NonRecursive)
        .map_err(|e| ServeError::access(root, notify_to_io(e)))?;

    let scope = RootScope::new(root);
    let (tokio_tx, tokio_rx) = tokio_mpsc::channel::<WatchMessage>(CHANNEL_CAPACITY);

    // Bridge: spawn_blocking to receive from std channel, classify, forward to tokio
    let bridge_task = tokio::task::spawn_blocking(move || {
        while let Ok(result) = std_rx.recv() {
            let classified = match result {
                Ok(event) => classify_event(&event, &scope, &filter),
                Err(err) => Err(ServeError::from(err)),
            };
            match classified {
                Ok(events) => {
                    for watch_event in events {
                        if tokio_tx.blocking_send(Ok(watch_event)).is_err() {
                            return; // receiver dropped, shutdown
                        }
                    }
                }
                Err(err) => {
                    let _ = tokio_tx.blocking_send(Err(err));
                    return;
                }
            }
        }
    });

    Ok((
        WatcherHandle {
            watcher,
            sender,
            bridge_task,
        },
        tokio_rx,
    ))
}

fn notify_to_io(err: notify::Error) -> io::Error {
    match err.kind {
        notify::ErrorKind::Io(e) => e,
        notify::ErrorKind::PathNotFound => io::Error::from(io::ErrorKind::NotFound),
        other => io::Error::other(format!("{other:?}")),
    }
}

/// The watched root as given and as canonicalized; backends may report either.
struct RootScope {
    roots: Vec<PathBuf>,
}

impl RootScope {
    fn new(root: &Path) -> Self {
        let mut roots = vec![root.to_path_buf()];
        if let Ok(canonical) = root.canonicalize()
            && canonical != root
        {
            roots.push(canonical);
        }
        Self { roots }
    }

    fn is_root(&self, path: &Path) -> bool {
        self.roots.iter().any(|r| r == path)
    }

    /// Name of `path` if it is an immediate child of the root.
    fn child_name(&self, path: &Path) -> Option<OsString> {
        let parent = path.parent()?;
        if self.is_root(parent) {
            path.file_name().map(|n| n.to_os_string())
        } else {
            None
        }
    }
}

/// Map one notify event to zero or more `WatchEvent`s.
///
/// An event on the root itself after the root has gone away ends the stream
/// with `ServeError::Watch`.
fn classify_event(
    event: &notify::Event,
    scope: &RootScope,
    filter: &EntryFilter,
) -> Result<Vec<WatchEvent>> {
    if let Some(root) = event.paths.iter().find(|p| scope.is_root(p))
        && !root.exists()
    {
        return Err(ServeError::Watch(format!(
            "watched directory {} was removed",
            root.display()
        )));
    }

    let mut out = Vec::new();
    for (index, path) in event.paths.iter().enumerate() {
        let Some(name) = scope.child_name(path) else {
            continue;
        };
        if !filter.admits(&name) {
            continue;
        }
        let entry = FileEntry::new(name);

        let classified = match event.kind {
            EventKind::Create(_) => WatchEvent::Added(entry),
            EventKind::Remove(_) => WatchEvent::Deleted(entry),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => WatchEvent::Deleted(entry),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => WatchEvent::Added(entry),
            // paths[0] is the old name, paths[1] the new one.
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if index == 0 {
                    WatchEvent::Deleted(entry)
                } else {
                    WatchEvent::Added(entry)
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                if path.exists() {
                    WatchEvent::Added(entry)
                } else {
                    WatchEvent::Deleted(entry)
                }
            }
            EventKind::Modify(_) => WatchEvent::Changed(entry),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => continue,
        };
        out.push(classified);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::fs;
    use std::time::Duration;

    fn scope(root: &Path) -> RootScope {
        RootScope {
            roots: vec![root.to_path_buf()],
        }
    }

    fn classify(kind: EventKind, paths: &[&str]) -> Vec<WatchEvent> {
        let mut event = notify::Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        classify_event(&event, &scope(Path::new("/w")), &EntryFilter::all()).unwrap()
    }

    #[test]
    fn test_create_and_remove() {
        assert_eq!(
            classify(EventKind::Create(CreateKind::File), &["/w/a.txt"]),
            vec![WatchEvent::Added("a.txt".into())]
        );
        assert_eq!(
            classify(EventKind::Remove(RemoveKind::File), &["/w/a.txt"]),
            vec![WatchEvent::Deleted("a.txt".into())]
        );
    }

    #[test]
    fn test_data_modify_is_changed() {
        assert_eq!(
            classify(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/w/a.txt"]
            ),
            vec![WatchEvent::Changed("a.txt".into())]
        );
    }

    #[test]
    fn test_rename_both_is_delete_then_add() {
        assert_eq!(
            classify(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/w/old.txt", "/w/new.txt"]
            ),
            vec![
                WatchEvent::Deleted("old.txt".into()),
                WatchEvent::Added("new.txt".into()),
            ]
        );
    }

    #[test]
    fn test_nested_paths_and_access_are_ignored() {
        assert!(classify(EventKind::Create(CreateKind::File), &["/w/sub/deep.txt"]).is_empty());
        assert!(classify(EventKind::Create(CreateKind::File), &["/elsewhere/a.txt"]).is_empty());
        assert!(
            classify(
                EventKind::Access(notify::event::AccessKind::Any),
                &["/w/a.txt"]
            )
            .is_empty()
        );
    }

    #[test]
    fn test_filtered_names_are_ignored() {
        let filter = EntryFilter::from_config(&crate::config::ServeConfig {
            show_hidden: false,
            ..Default::default()
        });
        let event = notify::Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/w/.swp"));
        let events = classify_event(&event, &scope(Path::new("/w")), &filter).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_removed_root_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("gone");
        let event = notify::Event::new(EventKind::Remove(RemoveKind::Folder)).add_path(root.clone());
        let err = classify_event(&event, &scope(&root), &EntryFilter::all()).unwrap_err();
        assert!(matches!(err, ServeError::Watch(_)));
    }

    #[tokio::test]
    async fn test_start_on_missing_directory_is_access_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let err = start_watcher(&missing, EntryFilter::all()).err().expect("should fail");
        assert!(matches!(err, ServeError::Access { .. }), "got {err:?}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watcher_reports_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut rx) = start_watcher(dir.path(), EntryFilter::all()).unwrap();

        fs::write(dir.path().join("new.txt"), "hello").unwrap();

        let found = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(msg) = rx.recv().await {
                if let Ok(WatchEvent::Added(entry)) = msg
                    && entry.as_str() == Some("new.txt")
                {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);

        assert!(found, "should receive Added(new.txt) after file creation");
        handle.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_closes_event_channel() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, mut rx) = start_watcher(dir.path(), EntryFilter::all()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle.stop())
            .await
            .expect("stop should not wait on notify's own thread");

        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok(), "event channel still open after stop");
    }
}
