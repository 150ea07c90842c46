pub mod analyze;
pub mod ingest;
pub mod webhook;

pub use analyze::handle_analyze;
pub use ingest::{handle_download, handle_recalculate, handle_reread, handle_upload};
pub use webhook::handle_webhook;

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use towlog::config::Settings;
use towlog::ddb::DdbDirectory;
use towlog::file_store::LocalFileStore;
use towlog::flights_repo::LocalFlightStore;
use towlog::live_tracking::HttpLiveTrackingSource;
use towlog::pipeline::IngestionPipeline;
use tracing::info;

/// Wire the pipeline to local storage, the device database and live tracking
pub async fn build_pipeline(settings: &Settings) -> Result<IngestionPipeline> {
    let flights = LocalFlightStore::open(&settings.flight_store)
        .await
        .with_context(|| format!("Failed to open flight store {:?}", settings.flight_store))?;
    let files = LocalFileStore::new(&settings.storage_root);

    let client = reqwest::Client::builder()
        .timeout(settings.http_timeout())
        .user_agent(concat!("towlog/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let directory = DdbDirectory::new(client.clone(), settings.ddb_url.clone());
    let live_tracking = HttpLiveTrackingSource::new(client, settings.live_tracking_url.clone());

    info!(
        "Storing logs under {:?}, flights in {:?}",
        settings.storage_root, settings.flight_store
    );
    Ok(IngestionPipeline::new(
        Arc::new(flights),
        Arc::new(files),
        Arc::new(directory),
        Arc::new(live_tracking),
    ))
}

/// Print a result as pretty JSON on stdout
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
