use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;
use towlog::config::Settings;
use towlog::pipeline::UploadedFile;
use tracing::{info, warn};
use uuid::Uuid;

use super::{build_pipeline, print_json};

/// Upload local files, one after another
pub async fn handle_upload(settings: &Settings, airfield: &str, paths: &[PathBuf]) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("Invalid file name {:?}", path))?
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        files.push(UploadedFile { filename, bytes });
    }

    let pipeline = build_pipeline(settings).await?;
    let entries = pipeline.upload_batch(airfield, files).await;

    let mut failed = 0;
    for entry in &entries {
        match &entry.result {
            Ok(outcome) => print_json(outcome)?,
            Err(e) => {
                failed += 1;
                warn!("{}: {}", entry.filename, e);
            }
        }
    }
    info!(
        "Uploaded {} of {} files",
        entries.len() - failed,
        entries.len()
    );

    if failed > 0 {
        return Err(anyhow!("{} of {} uploads failed", failed, entries.len()));
    }
    Ok(())
}

/// Re-run ingestion for a log already in storage
pub async fn handle_reread(settings: &Settings, airfield: &str, filename: &str) -> Result<()> {
    let pipeline = build_pipeline(settings).await?;
    match pipeline
        .read_and_process(airfield, filename)
        .await
        .with_context(|| format!("Failed to process {}", filename))?
    {
        Some(outcome) => print_json(&outcome),
        None => {
            warn!("Processing of {} was abandoned", filename);
            Ok(())
        }
    }
}

/// Download a tracker's log from live tracking now
pub async fn handle_download(settings: &Settings, airfield: &str, tracker_id: &str) -> Result<()> {
    let pipeline = build_pipeline(settings).await?;
    match pipeline
        .download_and_process(airfield, tracker_id)
        .await
        .with_context(|| format!("Failed to download log of {}", tracker_id))?
    {
        Some(outcome) => print_json(&outcome),
        None => {
            warn!("Processing of tracker {} was abandoned", tracker_id);
            Ok(())
        }
    }
}

pub async fn handle_recalculate(settings: &Settings, flight_id: Uuid) -> Result<()> {
    let pipeline = build_pipeline(settings).await?;
    let statistics = pipeline
        .recalculate_statistics(flight_id)
        .await
        .with_context(|| format!("Failed to recalculate flight {}", flight_id))?;
    print_json(&statistics)
}
