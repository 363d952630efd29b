mod cli;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};
use dirserve::{DirectoryLister, EntryFilter, ServeConfig, WatchSession};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve {
            dir,
            port,
            host,
            config,
        } => {
            let mut config = ServeConfig::load(&config);
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(host) = host {
                config.host = host;
            }
            serve(config, dir).await
        }
        Commands::List { dir, json, config } => list(&dir, json, &ServeConfig::load(&config)),
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "dirserve=debug"
    } else {
        "dirserve=info"
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Run the session until Ctrl-C, taking directory selections from stdin.
async fn serve(config: ServeConfig, first: Option<PathBuf>) -> Result<()> {
    let session = WatchSession::spawn(config);

    let mut status = session.subscribe();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            match current.local_addr {
                Some(addr) => eprintln!("[{}] {} (http://{addr})", current.state, current.message),
                None => eprintln!("[{}] {}", current.state, current.message),
            }
        }
    });

    let mut selected_any = false;
    if let Some(dir) = first {
        session.select(dir).await?;
        selected_any = true;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let path = line.trim();
                    if !path.is_empty() {
                        session.select(PathBuf::from(path)).await?;
                        selected_any = true;
                    }
                }
                Ok(None) | Err(_) => {
                    stdin_open = false;
                    if !selected_any {
                        break;
                    }
                }
            },
        }
    }

    session.shutdown().await;
    Ok(())
}

fn list(dir: &Path, json: bool, config: &ServeConfig) -> Result<()> {
    let lister = DirectoryLister::new(EntryFilter::from_config(config));
    let names = lister.list(dir)?.names();

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}
