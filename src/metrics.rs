use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tracing::info;

/// Install the Prometheus recorder
///
/// With a port, metrics are served for scraping at `http://0.0.0.0:<port>/metrics`
/// and no handle is returned. Without one, the returned handle renders them
/// on demand. Must be called from within the tokio runtime.
pub fn init_metrics(listen_port: Option<u16>) -> Result<Option<PrometheusHandle>> {
    match listen_port {
        Some(port) => {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .context("Failed to install Prometheus exporter")?;
            info!("Serving metrics on http://{}/metrics", addr);
            Ok(None)
        }
        None => {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .context("Failed to install Prometheus recorder")?;
            Ok(Some(handle))
        }
    }
}

/// Initialize ingestion metrics to zero so they appear in exports before the
/// first flight is processed
pub fn initialize_ingest_metrics() {
    metrics::counter!("ingest.flights_created_total").absolute(0);
    metrics::counter!("ingest.duplicates_total").absolute(0);
    metrics::counter!("ingest.tow_links_total").absolute(0);
    metrics::counter!("ingest.retention_expired_total").absolute(0);

    // Abandoned runs are labelled by error kind
    for reason in ["format", "insufficient_data", "not_found", "collaborator"] {
        metrics::counter!("ingest.abandoned_total", "reason" => reason).absolute(0);
    }
}
