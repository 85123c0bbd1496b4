//! rybu-offline - drive the RybuHome offline cache from a terminal.
//!
//! Installs the asset manifest into an on-disk cache, serves URLs
//! cache-first (optionally with the network unplugged), refreshes the live
//! bucket and lists what is stored.

mod commands;
mod config;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use rybu_offline_core::Destination;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::Host;
use config::Config;

#[derive(Debug, Parser)]
#[command(name = "rybu-offline", version, about = "Offline cache manager for the RybuHome site")]
struct Cli {
    /// Config file (defaults to ~/.config/rybu-offline/config.json)
    #[arg(long, global = true, env = "RYBU_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Install the manifest under the configured version and activate it
    Install,
    /// Fetch a URL through the worker
    Fetch {
        url: String,
        /// Request destination; guessed from the path when omitted
        #[arg(long, value_enum)]
        destination: Option<DestinationArg>,
        /// Fail every network request, as if the machine were offline
        #[arg(long)]
        offline: bool,
    },
    /// Re-fetch the manifest into the live bucket
    Update,
    /// List cache buckets; the live one is marked with *
    Buckets,
    /// List entries of a bucket (the live one by default)
    Entries {
        #[arg(long)]
        bucket: Option<String>,
    },
    /// Print the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        save: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DestinationArg {
    Document,
    Image,
    Script,
    Style,
    Font,
    Empty,
}

impl From<DestinationArg> for Destination {
    fn from(arg: DestinationArg) -> Self {
        match arg {
            DestinationArg::Document => Destination::Document,
            DestinationArg::Image => Destination::Image,
            DestinationArg::Script => Destination::Script,
            DestinationArg::Style => Destination::Style,
            DestinationArg::Font => Destination::Font,
            DestinationArg::Empty => Destination::Empty,
        }
    }
}

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes buffered log lines when dropped.
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing();
    info!("rybu-offline starting");

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Install => commands::install(&Host::new(config, false).await?).await,
        Command::Fetch {
            url,
            destination,
            offline,
        } => {
            let host = Host::new(config, offline).await?;
            commands::fetch(&host, &url, destination.map(Destination::from)).await
        }
        Command::Update => commands::update(&Host::new(config, false).await?).await,
        Command::Buckets => commands::buckets(&Host::new(config, false).await?).await,
        Command::Entries { bucket } => {
            commands::entries(&Host::new(config, false).await?, bucket.as_deref()).await
        }
        Command::Config { save } => {
            commands::show_config(&config)?;
            if save {
                let path = config.save(cli.config.as_deref())?;
                eprintln!("Saved to {}", path.display());
            }
            Ok(())
        }
    }
}
