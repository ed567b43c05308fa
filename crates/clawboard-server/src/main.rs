//! # clawboard-server
//!
//! Service binary: reads configuration from the environment, wires the
//! store, event hub, ingest service, vector index, search engine,
//! classifier, orchestration runtime, and background workers, then serves
//! the HTTP API until interrupted.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod wiring;

/// Clawboard capture-and-organize service.
#[derive(Parser)]
#[command(name = "clawboard-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the service (API + background workers).
    Serve {
        /// Bind address override, e.g. 127.0.0.1:8010
        #[arg(short, long)]
        bind: Option<String>,
        /// Disable background workers (API only).
        #[arg(long)]
        no_workers: bool,
    },
    /// Run one vector maintenance pass and exit.
    Maintenance {
        /// Report what would change without writing.
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Serve { bind, no_workers } => {
            runtime.block_on(wiring::serve(bind, !no_workers))
        }
        Commands::Maintenance { dry_run } => runtime.block_on(wiring::maintenance(dry_run)),
    }
}
