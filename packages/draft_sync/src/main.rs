use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

use draft_sync::config::{DraftSyncConfig, FileConfig, load_config};
use draft_sync::model::AnalysisMode;

mod cli;

#[derive(Parser)]
#[command(name = "draftd")]
#[command(about = "Live draft sync relay and window engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.draftsync)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync relay in the foreground
    Relay(RelayArgs),

    /// Join the bus as an overlay window and log every state change
    Watch,

    /// Act as the primary window: read poller snapshots and commands as
    /// JSON lines on stdin
    Feed(FeedArgs),
}

#[derive(Parser)]
struct RelayArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,
}

#[derive(Parser)]
struct FeedArgs {
    /// Start this analysis whenever a roster's membership changes
    #[arg(long, value_enum)]
    analyze: Option<AnalysisMode>,

    /// Answer sync requests even with no state (overrides config)
    #[arg(long)]
    authoritative: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "draftd=debug,draft_sync=debug,lane_inference=debug,tower_http=debug,info"
    } else {
        "draftd=info,draft_sync=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let config = DraftSyncConfig::new(cli.data_dir)?;
    let file_config: FileConfig = load_config(&config.data_dir)
        .extract()
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Relay(args) => cli::relay_command(&file_config, args.host, args.port).await,
        Commands::Watch => cli::watch_command(&config, &file_config).await,
        Commands::Feed(args) => {
            cli::feed_command(&config, &file_config, args.analyze, args.authoritative).await
        }
    }
}
