mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use towlog::config::{Settings, config_path};
use towlog::log_format::init_tracing;
use towlog::metrics::{init_metrics, initialize_ingest_metrics};
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "towlog")]
#[command(about = "Glider and tow-plane flight log ingestion", version)]
struct Cli {
    /// Settings file (overrides TOWLOG_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and analyze an IGC file without storing it
    Analyze {
        path: PathBuf,
    },

    /// Upload IGC files named `<date>_<registration>.<tracker>.igc`
    Upload {
        #[arg(short, long)]
        airfield: String,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Process a log already in storage again
    Reread {
        #[arg(short, long)]
        airfield: String,

        filename: String,
    },

    /// Download a tracker's log from live tracking and process it now
    Download {
        #[arg(short, long)]
        airfield: String,

        tracker_id: String,
    },

    /// Read a landing event as JSON from stdin and download after a delay
    Webhook {
        /// Delay in seconds (defaults to the configured download delay)
        #[arg(long)]
        delay: Option<u64>,
    },

    /// Recompute the statistics of a stored flight
    Recalculate {
        flight_id: Uuid,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let path = cli.config.unwrap_or_else(config_path);
    let settings = Settings::load_or_default(&path)?;
    debug!("Settings from {:?}: {:?}", path, settings);

    let metrics = init_metrics(settings.metrics_port)?;
    initialize_ingest_metrics();

    let result = match cli.command {
        Commands::Analyze { path } => commands::handle_analyze(&path).await,
        Commands::Upload { airfield, files } => {
            commands::handle_upload(&settings, &airfield, &files).await
        }
        Commands::Reread { airfield, filename } => {
            commands::handle_reread(&settings, &airfield, &filename).await
        }
        Commands::Download {
            airfield,
            tracker_id,
        } => commands::handle_download(&settings, &airfield, &tracker_id).await,
        Commands::Webhook { delay } => {
            commands::handle_webhook(&settings, delay.map(Duration::from_secs)).await
        }
        Commands::Recalculate { flight_id } => {
            commands::handle_recalculate(&settings, flight_id).await
        }
    };

    if let Some(handle) = metrics {
        debug!("Ingest metrics:\n{}", handle.render());
    }
    result
}
