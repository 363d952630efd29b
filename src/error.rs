use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures surfaced by the listing, serving and watching layers.
///
/// `Access` covers unreadable or vanished directories, `Bind`/`Permission` cover
/// the HTTP listener failing to claim its port, `Encode` covers an index page
/// that could not be produced, and `Watch` covers the change stream ending.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("cannot read directory {}: {source}", path.display())]
    Access {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("permission denied binding {addr}: {source}")]
    Permission {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("index page could not be rendered: {0}")]
    Encode(String),

    #[error("watcher stopped: {0}")]
    Watch(String),
}

impl ServeError {
    pub fn access(path: &Path, source: io::Error) -> Self {
        Self::Access {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Classify a listener bind failure. Privileged-port refusals become
    /// `Permission`; everything else (most commonly `AddrInUse`) is `Bind`.
    pub fn classify_bind(addr: SocketAddr, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::PermissionDenied => Self::Permission { addr, source },
            _ => Self::Bind { addr, source },
        }
    }

    /// Short label used in status messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Access { .. } => "AccessError",
            Self::Bind { .. } => "BindError",
            Self::Permission { .. } => "PermissionError",
            Self::Encode(_) => "EncodeError",
            Self::Watch(_) => "WatchError",
        }
    }
}

impl From<std::fmt::Error> for ServeError {
    fn from(err: std::fmt::Error) -> Self {
        Self::Encode(err.to_string())
    }
}

impl From<notify::Error> for ServeError {
    fn from(err: notify::Error) -> Self {
        Self::Watch(err.to_string())
    }
}

pub type Result<T, E = ServeError> = std::result::Result<T, E>;
