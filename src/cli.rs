use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Serve a local directory over HTTP with a live index page.
///
/// dirserve lists the chosen directory as links at `/`, serves the files
/// themselves under `/<name>`, and keeps the index in step with files being
/// added, changed and deleted.
#[derive(Parser, Debug)]
#[command(
    name = "dirserve",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    /// Log debug output from dirserve.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch and serve a directory.
    ///
    /// Further directories may be selected by writing their paths to stdin, one
    /// per line; each selection replaces the current one. Ctrl-C stops.
    Serve {
        /// Directory to serve first.
        dir: Option<PathBuf>,

        /// Port to listen on (overrides the config file).
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind (overrides the config file).
        #[arg(long)]
        host: Option<IpAddr>,

        /// Path to the config file.
        #[arg(long, default_value = dirserve::config::CONFIG_FILE)]
        config: PathBuf,
    },

    /// Print the listing the index page would show for a directory.
    List {
        /// Directory to list.
        dir: PathBuf,

        /// Output a JSON array of names instead of one name per line.
        #[arg(long)]
        json: bool,

        /// Path to the config file.
        #[arg(long, default_value = dirserve::config::CONFIG_FILE)]
        config: PathBuf,
    },
}
