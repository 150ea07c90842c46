//! Downloads triggered by live tracking events
//!
//! The live tracking service announces a landing before the full log is
//! available, so the download runs after a delay. A job that only gets to run
//! long after its event would fetch a log the service no longer holds; such
//! jobs are dropped without being attempted.

use chrono::{DateTime, TimeDelta, Utc};
use metrics::counter;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::errors::IngestResult;
use crate::pipeline::{IngestOutcome, IngestionPipeline};

/// Hours after its event during which a download may still be attempted
pub const RETENTION_WINDOW_HOURS: i64 = 24;

/// A pending download for one tracker
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DelayedDownload {
    pub airfield: String,
    pub tracker_id: String,
    pub event_time: DateTime<Utc>,
}

impl DelayedDownload {
    pub fn new(
        airfield: impl Into<String>,
        tracker_id: impl Into<String>,
        event_time: DateTime<Utc>,
    ) -> Self {
        Self {
            airfield: airfield.into(),
            tracker_id: tracker_id.into(),
            event_time,
        }
    }

    /// Whether the retention window has passed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.event_time > TimeDelta::hours(RETENTION_WINDOW_HOURS)
    }

    /// Execute the download as of `now`. An expired job is logged and yields
    /// `Ok(None)` without contacting anything.
    pub async fn run_at(
        &self,
        pipeline: &IngestionPipeline,
        now: DateTime<Utc>,
    ) -> IngestResult<Option<IngestOutcome>> {
        if self.is_expired(now) {
            error!(
                "Dropping download for tracker {} at {}: event at {} is outside the retention window",
                self.tracker_id, self.airfield, self.event_time
            );
            counter!("ingest.retention_expired_total").increment(1);
            return Ok(None);
        }
        pipeline
            .download_and_process(&self.airfield, &self.tracker_id)
            .await
    }

    pub async fn run(&self, pipeline: &IngestionPipeline) -> IngestResult<Option<IngestOutcome>> {
        self.run_at(pipeline, Utc::now()).await
    }
}

/// Run `job` on the runtime once `delay` has elapsed. Failures are logged;
/// jobs are never retried.
pub fn schedule(
    pipeline: Arc<IngestionPipeline>,
    job: DelayedDownload,
    delay: Duration,
) -> JoinHandle<()> {
    info!(
        "Scheduling download for tracker {} at {} in {}s",
        job.tracker_id,
        job.airfield,
        delay.as_secs()
    );
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match job.run(&pipeline).await {
            Ok(Some(outcome)) => info!(
                "Delayed download for {} recorded flight {}",
                job.tracker_id, outcome.flight_id
            ),
            Ok(None) => {}
            Err(e) => error!("Delayed download for {} failed: {}", job.tracker_id, e),
        }
    })
}
