pub mod state;

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::ServeConfig;
use crate::error::ServeError;
use crate::gateway::{GatewayState, HttpGateway};
use crate::lister::{DirectoryLister, EntryFilter};
use crate::render::IndexRenderer;
use crate::store::ListingStore;
use crate::watcher::{self, WatchMessage, WatcherHandle};

pub use state::{Effect, SessionEvent, SessionState, Transition};

/// User-visible view of the session, published on every change. The watched
/// root is `state.root()`.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Short human-readable line: "Watching docs", "New: a.txt", or a failure reason.
    pub message: String,
    /// Where the server is accepting, while it runs.
    pub local_addr: Option<SocketAddr>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            message: "Choose a folder".to_string(),
            local_addr: None,
        }
    }
}

/// The session task has exited and no longer accepts commands.
#[derive(Debug, thiserror::Error)]
#[error("session is no longer running")]
pub struct SessionClosed;

enum Command {
    Select(PathBuf),
    Shutdown(oneshot::Sender<()>),
}

/// Control surface for a running session task.
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Ask the session to watch and serve `root`. Returns once the request is
    /// queued; progress is reported through [`SessionHandle::subscribe`].
    pub async fn select(&self, root: impl Into<PathBuf>) -> Result<(), SessionClosed> {
        self.commands
            .send(Command::Select(root.into()))
            .await
            .map_err(|_| SessionClosed)
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Tear everything down and wait for the session task to exit.
    pub async fn shutdown(self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
        if let Err(err) = self.task.await {
            tracing::warn!("session task ended abnormally: {err}");
        }
    }
}

/// Resources owned by the current root. Dropped together on teardown.
struct Resources {
    store: ListingStore,
    gateway: HttpGateway,
    watcher: Option<WatcherHandle>,
    consumer: Option<JoinHandle<()>>,
}

/// Drives the state machine: applies transitions and executes their effects.
pub struct WatchSession {
    config: ServeConfig,
    lister: DirectoryLister,
    renderer: IndexRenderer,
    state: SessionState,
    /// Bumped per watcher; stale end-of-stream notices carry an old value.
    generation: u64,
    resources: Option<Resources>,
    status: Arc<watch::Sender<SessionStatus>>,
    watch_ended_tx: mpsc::UnboundedSender<(u64, ServeError)>,
}

impl WatchSession {
    /// Spawn the session task and return its handle.
    pub fn spawn(config: ServeConfig) -> SessionHandle {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let (watch_ended_tx, watch_ended_rx) = mpsc::unbounded_channel();

        let lister = DirectoryLister::new(EntryFilter::from_config(&config));
        let renderer = IndexRenderer::new(config.title.clone());
        let session = Self {
            config,
            lister,
            renderer,
            state: SessionState::Idle,
            generation: 0,
            resources: None,
            status: Arc::new(status_tx),
            watch_ended_tx,
        };

        let task = tokio::spawn(session.run(commands_rx, watch_ended_rx));
        SessionHandle {
            commands: commands_tx,
            status: status_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut watch_ended: mpsc::UnboundedReceiver<(u64, ServeError)>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Select(root)) => self.handle(SessionEvent::Select(root)).await,
                    Some(Command::Shutdown(done)) => {
                        self.handle(SessionEvent::Shutdown).await;
                        let _ = done.send(());
                        return;
                    }
                    None => {
                        self.handle(SessionEvent::Shutdown).await;
                        return;
                    }
                },
                Some((generation, err)) = watch_ended.recv() => {
                    if generation == self.generation {
                        self.handle(SessionEvent::WatchEnded(err)).await;
                    } else {
                        tracing::debug!("discarding stale watcher end: {err}");
                    }
                }
            }
        }
    }

    /// Feed `event` through the state machine, then run effects until no
    /// follow-up events remain.
    async fn handle(&mut self, event: SessionEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let current = std::mem::replace(&mut self.state, SessionState::Idle);
            let previous = current.clone();
            let Transition { next, effects } = current.on(event);
            if next != previous {
                tracing::info!("session {next}");
            }
            self.state = next;

            for effect in effects {
                if let Some(follow_up) = self.execute(effect).await {
                    queue.push_back(follow_up);
                }
            }
            // Published after the effects so the state and its message land together.
            self.publish(|status| status.state = self.state.clone());
        }
    }

    async fn execute(&mut self, effect: Effect) -> Option<SessionEvent> {
        match effect {
            Effect::Teardown => {
                self.teardown().await;
                Some(SessionEvent::TornDown)
            }
            Effect::List(root) => Some(self.list(root).await),
            Effect::ResetAndServe { root, listing } => {
                let store = ListingStore::new(root, self.lister.clone());
                store.reset(listing).await;
                let state = GatewayState::new(store.clone(), self.renderer.clone());
                let mut gateway = HttpGateway::new(self.config.bind_addr(), state);
                match gateway.start().await {
                    Ok(addr) => {
                        self.resources = Some(Resources {
                            store,
                            gateway,
                            watcher: None,
                            consumer: None,
                        });
                        self.publish(|status| status.local_addr = Some(addr));
                        Some(SessionEvent::Served(addr))
                    }
                    Err(err) => Some(SessionEvent::StartFailed(err)),
                }
            }
            Effect::Watch(root) => Some(self.watch(&root)),
            Effect::Report(message) => {
                tracing::info!("{message}");
                self.publish(|status| status.message = message);
                None
            }
        }
    }

    async fn list(&self, root: PathBuf) -> SessionEvent {
        let lister = self.lister.clone();
        let selected = root.clone();
        let result = tokio::task::spawn_blocking(move || {
            let canonical = root
                .canonicalize()
                .map_err(|e| ServeError::access(&root, e))?;
            let listing = lister.list(&canonical)?;
            Ok::<_, ServeError>((canonical, listing))
        })
        .await;

        match result {
            Ok(Ok((root, listing))) => SessionEvent::Listed { root, listing },
            Ok(Err(err)) => SessionEvent::StartFailed(err),
            Err(err) => SessionEvent::StartFailed(ServeError::access(
                &selected,
                std::io::Error::other(err.to_string()),
            )),
        }
    }

    fn watch(&mut self, root: &Path) -> SessionEvent {
        let Some(resources) = self.resources.as_mut() else {
            return SessionEvent::StartFailed(ServeError::Watch(
                "no server running for watched root".to_string(),
            ));
        };

        let (handle, rx) = match watcher::start_watcher(root, self.lister.filter().clone()) {
            Ok(pair) => pair,
            Err(err) => return SessionEvent::StartFailed(err),
        };

        self.generation += 1;
        let generation = self.generation;
        let store = resources.store.clone();
        let status = Arc::clone(&self.status);
        let watch_ended_tx = self.watch_ended_tx.clone();
        let consumer = tokio::spawn(async move {
            // Pick up anything created between the initial listing and the watcher start.
            store.rescan().await;
            let err = consume_events(&store, rx, &status).await;
            let _ = watch_ended_tx.send((generation, err));
        });

        resources.watcher = Some(handle);
        resources.consumer = Some(consumer);
        SessionEvent::Watching
    }

    /// Release the current root's watcher and server. Errors are logged, never fatal.
    async fn teardown(&mut self) {
        let Some(resources) = self.resources.take() else {
            return;
        };
        let Resources {
            store,
            mut gateway,
            watcher,
            consumer,
        } = resources;

        if let Some(consumer) = consumer {
            consumer.abort();
            if let Err(err) = consumer.await
                && !err.is_cancelled()
            {
                tracing::warn!("event consumer for {} failed: {err}", store.root().display());
            }
        }
        if let Some(watcher) = watcher {
            watcher.stop().await;
        }
        gateway.stop(self.config.stop_timeout()).await;
        self.publish(|status| status.local_addr = None);
    }

    fn publish(&self, update: impl FnOnce(&mut SessionStatus)) {
        self.status.send_modify(update);
    }
}

/// Apply watcher events to `store` in arrival order until the stream ends.
///
/// Returns the reason the stream ended: the watcher's own error, or a
/// `Watch` error if the channel simply closed.
pub async fn consume_events(
    store: &ListingStore,
    mut events: mpsc::Receiver<WatchMessage>,
    status: &watch::Sender<SessionStatus>,
) -> ServeError {
    while let Some(message) = events.recv().await {
        match message {
            Ok(event) => {
                let line = event.describe();
                tracing::debug!("{line}");
                store.apply(event).await;
                status.send_modify(|s| s.message = line);
            }
            Err(err) => {
                tracing::error!("{err}");
                return err;
            }
        }
    }
    ServeError::Watch("event stream closed".to_string())
}
