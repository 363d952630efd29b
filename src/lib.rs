//! Serve a local directory over HTTP with an index page that tracks the
//! directory's contents live.
//!
//! A [`session::WatchSession`] owns one watched root at a time: it lists the
//! directory, starts the [`gateway::HttpGateway`], and feeds
//! [`watcher`] events into the [`store::ListingStore`] that the index route
//! reads from.

pub mod config;
pub mod error;
pub mod gateway;
pub mod lister;
pub mod listing;
pub mod render;
pub mod session;
pub mod store;
pub mod watcher;

pub use config::ServeConfig;
pub use error::ServeError;
pub use lister::{DirectoryLister, EntryFilter};
pub use listing::{FileEntry, Listing};
pub use render::IndexRenderer;
pub use session::{SessionHandle, SessionState, SessionStatus, WatchSession};
pub use store::ListingStore;
