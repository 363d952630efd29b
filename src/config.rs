use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "dirserve.toml";

/// Configuration loaded from `dirserve.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Interface the HTTP listener binds to.
    pub host: IpAddr,
    /// Listener port. Defaults to the well-known HTTP port.
    pub port: u16,
    /// How long `stop` waits for in-flight requests before force-closing.
    pub stop_timeout_secs: u64,
    /// Heading and `<title>` of the index page.
    pub title: String,
    /// Whether dot-files appear in the listing.
    pub show_hidden: bool,
    /// Glob patterns; entries whose name matches any of them are left out.
    pub exclude: Vec<String>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 80,
            stop_timeout_secs: 10,
            title: "Directory index".to_string(),
            show_hidden: true,
            exclude: Vec::new(),
        }
    }
}

impl ServeConfig {
    /// Load configuration from `path`.
    ///
    /// Returns the default configuration if the file does not exist or cannot be parsed.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!("failed to parse {}: {err}. Using defaults.", path.display());
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!("failed to read {}: {err}. Using defaults.", path.display());
                Self::default()
            }
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}
