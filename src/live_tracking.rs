use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

/// Source of raw IGC logs for a tracker
#[async_trait]
pub trait LiveTrackingSource: Send + Sync {
    /// Download the log recorded for `tracker_id`, optionally restricted to a
    /// `[start, end)` window
    async fn download(
        &self,
        tracker_id: &str,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<u8>>;
}

/// Live tracking service serving logs at `<base_url>/igc/<tracker_id>`
#[derive(Clone)]
pub struct HttpLiveTrackingSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLiveTrackingSource {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, tracker_id: &str) -> String {
        format!("{}/igc/{}", self.base_url, tracker_id)
    }
}

#[async_trait]
impl LiveTrackingSource for HttpLiveTrackingSource {
    async fn download(
        &self,
        tracker_id: &str,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<u8>> {
        let url = self.url_for(tracker_id);
        let mut request = self.client.get(&url);
        if let Some((start, end)) = window {
            request = request.query(&[
                ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ]);
        }

        let bytes = request
            .send()
            .await
            .with_context(|| format!("Failed to request {}", url))?
            .error_for_status()
            .with_context(|| format!("Live tracking returned an error for {}", tracker_id))?
            .bytes()
            .await
            .with_context(|| format!("Failed to read log body for {}", tracker_id))?;

        debug!("Downloaded {} bytes for tracker {}", bytes.len(), tracker_id);
        Ok(bytes.to_vec())
    }
}
