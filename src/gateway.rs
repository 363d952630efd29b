use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::{Result, ServeError};
use crate::render::IndexRenderer;
use crate::store::ListingStore;

/// How long force-closed connections get to unwind before the server task is aborted.
const FORCE_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Shared state behind both routes.
#[derive(Clone)]
pub struct GatewayState {
    store: ListingStore,
    renderer: Arc<IndexRenderer>,
    root: Arc<PathBuf>,
}

impl GatewayState {
    /// `root` is canonicalized when possible so containment checks compare like with like.
    pub fn new(store: ListingStore, renderer: IndexRenderer) -> Self {
        let root = store
            .root()
            .canonicalize()
            .unwrap_or_else(|_| store.root().to_path_buf());
        Self {
            store,
            renderer: Arc::new(renderer),
            root: Arc::new(root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Build the two-route router: `GET /` for the index, `GET /{*path}` for file bytes.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/{*path}", get(serve_path))
        .with_state(state)
}

async fn index(State(state): State<GatewayState>) -> Response {
    let listing = state.store.snapshot().await;
    tracing::debug!("GET / ({} entries)", listing.len());
    index_response(state.renderer.render(&listing))
}

fn index_response(rendered: Result<String>) -> Response {
    match rendered {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            tracing::error!("failed to render index: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn serve_path(State(state): State<GatewayState>, request: Request) -> Response {
    let Some(file) = resolve_under_root(&state.root, request.uri().path()).await else {
        tracing::debug!("GET {} -> 404", request.uri().path());
        return StatusCode::NOT_FOUND.into_response();
    };
    tracing::debug!("GET {} -> {}", request.uri().path(), file.display());

    let mime = mime_guess::from_path(&file).first_or_octet_stream();
    match ServeFile::new_with_mime(&file, &mime).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// Map a request path to a regular file under `root`.
///
/// Returns `None` for anything that is not a plain relative path (`..`, absolute
/// components), anything that does not exist, anything that is not a regular
/// file, and anything whose canonical location (after following symlinks) lies
/// outside `root`.
pub async fn resolve_under_root(root: &Path, request_path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(request_path.trim_start_matches('/')).ok()?;

    let mut candidate = root.to_path_buf();
    for component in Path::new(decoded.as_ref()).components() {
        match component {
            Component::Normal(part) => candidate.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    let canonical = tokio::fs::canonicalize(&candidate).await.ok()?;
    if !canonical.starts_with(root) {
        return None;
    }
    let metadata = tokio::fs::metadata(&canonical).await.ok()?;
    metadata.is_file().then_some(canonical)
}

/// Accepts TCP connections whose I/O fails once `closed` is cancelled.
///
/// `axum::serve` runs every connection on its own task, so aborting the serve
/// future alone leaves in-flight responses streaming.
struct ClosableListener {
    inner: TcpListener,
    closed: CancellationToken,
}

impl axum::serve::Listener for ClosableListener {
    type Io = ClosableStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        let (stream, addr) = axum::serve::Listener::accept(&mut self.inner).await;
        (ClosableStream::new(stream, self.closed.clone()), addr)
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

struct ClosableStream {
    io: TcpStream,
    token: CancellationToken,
    closed: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl ClosableStream {
    fn new(io: TcpStream, token: CancellationToken) -> Self {
        let closed = Box::pin(token.clone().cancelled_owned());
        Self { io, token, closed }
    }

    /// Registers the waker so a pending read or write wakes up on force-close.
    fn poll_closed(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        if self.token.is_cancelled() || self.closed.as_mut().poll(cx).is_ready() {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "connection force-closed",
            ));
        }
        Ok(())
    }
}

impl AsyncRead for ClosableStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(err) = this.poll_closed(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for ClosableStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Err(err) = this.poll_closed(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.io).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(err) = this.poll_closed(cx) {
            return Poll::Ready(Err(err));
        }
        Pin::new(&mut this.io).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}

struct Running {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    connections: CancellationToken,
    task: JoinHandle<io::Result<()>>,
}

/// One HTTP listener with an explicit start/stop lifecycle.
pub struct HttpGateway {
    addr: SocketAddr,
    state: GatewayState,
    running: Option<Running>,
}

impl HttpGateway {
    pub fn new(addr: SocketAddr, state: GatewayState) -> Self {
        Self {
            addr,
            state,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Bind the listener and begin accepting.
    ///
    /// Fails with `Bind` if the port is taken, `Permission` if the port is
    /// privileged and we may not claim it. Starting a running gateway returns
    /// its current address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let Some(running) = &self.running {
            return Ok(running.local_addr);
        }

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| ServeError::classify_bind(self.addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServeError::classify_bind(self.addr, e))?;

        let app = router(self.state.clone());
        let connections = CancellationToken::new();
        let listener = ClosableListener {
            inner: listener,
            closed: connections.clone(),
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        tracing::info!(
            "serving {} on http://{local_addr}",
            self.state.root().display()
        );
        self.running = Some(Running {
            local_addr,
            shutdown: shutdown_tx,
            connections,
            task,
        });
        Ok(local_addr)
    }

    /// Stop accepting and drain in-flight requests for up to `timeout`, then
    /// force-close every remaining connection. Stopping a stopped gateway is a no-op.
    pub async fn stop(&mut self, timeout: Duration) {
        let Some(Running {
            local_addr,
            shutdown,
            connections,
            mut task,
        }) = self.running.take()
        else {
            return;
        };

        let _ = shutdown.send(());
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(Ok(()))) => tracing::info!("server on {local_addr} stopped"),
            Ok(Ok(Err(err))) => tracing::warn!("server on {local_addr} ended with error: {err}"),
            Ok(Err(err)) => tracing::warn!("server task on {local_addr} failed: {err}"),
            Err(_) => {
                tracing::warn!(
                    "server on {local_addr} did not drain within {timeout:?}, forcing close"
                );
                connections.cancel();
                // The serve future resolves once every connection task has dropped its socket.
                if tokio::time::timeout(FORCE_CLOSE_GRACE, &mut task).await.is_err() {
                    task.abort();
                    let _ = task.await;
                }
            }
        }
    }
}

impl Drop for HttpGateway {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(());
            running.connections.cancel();
            running.task.abort();
        }
    }
}
