use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use towlog::flights::FlightStatistics;
use towlog::igc::parse_igc;
use towlog::statistics;
use tracing::info;

use super::print_json;

#[derive(Serialize)]
struct Analysis {
    aircraft_registration: String,
    aircraft_model: String,
    contest_id: Option<String>,
    flight_date: chrono::NaiveDate,
    waypoints: usize,
    statistics: FlightStatistics,
}

/// Parse and analyze a log without storing anything
pub async fn handle_analyze(path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    let parsed = parse_igc(&bytes).with_context(|| format!("Failed to parse {:?}", path))?;
    let statistics = statistics::analyze(&parsed.waypoints)
        .with_context(|| format!("Failed to analyze {:?}", path))?;

    info!(
        "Analyzed {} waypoints of {} on {}",
        parsed.waypoints.len(),
        parsed.aircraft_registration,
        parsed.flight_date
    );
    print_json(&Analysis {
        aircraft_registration: parsed.aircraft_registration,
        aircraft_model: parsed.aircraft_model,
        contest_id: parsed.contest_id,
        flight_date: parsed.flight_date,
        waypoints: parsed.waypoints.len(),
        statistics,
    })
}
