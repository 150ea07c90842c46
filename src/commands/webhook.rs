use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use towlog::config::Settings;
use towlog::delayed::{self, DelayedDownload};
use tracing::{info, warn};

use super::build_pipeline;

/// Read a landing event from stdin and run its download after the configured
/// delay. Ctrl-C cancels the pending job.
pub async fn handle_webhook(settings: &Settings, delay: Option<Duration>) -> Result<()> {
    let mut body = String::new();
    tokio::io::stdin()
        .read_to_string(&mut body)
        .await
        .context("Failed to read webhook payload from stdin")?;
    let job: DelayedDownload =
        serde_json::from_str(&body).context("Failed to parse webhook payload")?;

    let pipeline = Arc::new(build_pipeline(settings).await?);
    let delay = delay.unwrap_or_else(|| settings.download_delay());
    let handle = delayed::schedule(pipeline, job, delay);

    tokio::select! {
        result = handle => {
            result.context("Delayed download task panicked")?;
            info!("Webhook job finished");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, pending download cancelled");
        }
    }
    Ok(())
}
