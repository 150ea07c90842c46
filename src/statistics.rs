//! Flight statistics from a waypoint sequence
//!
//! The altitude series is smoothed with a 3-point moving average before tow
//! release detection; everything else (maximum altitude, post-release climb
//! and distance) is measured on the original GPS samples.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::{IngestError, IngestResult};
use crate::flights::{FlightStatistics, Waypoint};
use crate::geometry::haversine_distance_km;

/// Minimum number of waypoints needed to analyze a flight
pub const MIN_WAYPOINTS: usize = 10;

/// A waypoint with its altitude replaced by the smoothed value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedPoint {
    pub timestamp: DateTime<Utc>,
    pub altitude_m: f64,
    pub latitude: f64,
    pub longitude: f64,
}

/// Compute statistics for a flight whose waypoints are sorted by time
pub fn analyze(waypoints: &[Waypoint]) -> IngestResult<FlightStatistics> {
    if waypoints.len() < MIN_WAYPOINTS {
        return Err(IngestError::InsufficientData {
            count: waypoints.len(),
            required: MIN_WAYPOINTS,
        });
    }

    let max_altitude_m = waypoints
        .iter()
        .map(|w| w.gps_altitude_m)
        .max()
        .unwrap_or_default();

    let smoothed = smooth_altitudes(waypoints);
    let Some(release_index) = detect_release(&smoothed) else {
        debug!(
            "No tow release found in {} waypoints starting {}",
            waypoints.len(),
            waypoints[0].timestamp
        );
        return Ok(FlightStatistics {
            release_height_m: None,
            max_altitude_m,
            altitude_gained_m: None,
            distance_traveled_km: None,
            release_time: None,
        });
    };

    let release = &waypoints[release_index];
    let after_release: Vec<&Waypoint> = waypoints
        .iter()
        .filter(|w| w.timestamp > release.timestamp)
        .collect();

    debug!(
        "Tow release at {} ({} m), {} waypoints after release",
        release.timestamp,
        release.gps_altitude_m,
        after_release.len()
    );

    Ok(FlightStatistics {
        release_height_m: Some(release.gps_altitude_m),
        max_altitude_m,
        altitude_gained_m: Some(altitude_gained(&after_release)),
        distance_traveled_km: Some(distance_traveled_km(&after_release)),
        release_time: Some(release.timestamp),
    })
}

/// 3-point moving average of altitude; the first and last points average
/// over the two points available to them
pub fn smooth_altitudes(waypoints: &[Waypoint]) -> Vec<SmoothedPoint> {
    let last = waypoints.len().saturating_sub(1);
    waypoints
        .iter()
        .enumerate()
        .map(|(i, waypoint)| {
            let from = i.saturating_sub(1);
            let to = (i + 1).min(last);
            let window = &waypoints[from..=to];
            let sum: f64 = window.iter().map(|w| w.gps_altitude_m as f64).sum();
            SmoothedPoint {
                timestamp: waypoint.timestamp,
                altitude_m: sum / window.len() as f64,
                latitude: waypoint.latitude,
                longitude: waypoint.longitude,
            }
        })
        .collect()
}

/// Find the tow release: the last point before two consecutive descents
///
/// A descent at point `i` makes point `i - 1` the candidate. The candidate is
/// confirmed when point `i + 1` descends again and dropped when it climbs or
/// holds.
pub fn detect_release(points: &[SmoothedPoint]) -> Option<usize> {
    let mut candidate: Option<usize> = None;

    for i in 1..points.len() {
        let descending = points[i].altitude_m < points[i - 1].altitude_m;
        match candidate {
            Some(release) if descending => return Some(release),
            Some(_) => candidate = None,
            None if descending => candidate = Some(i - 1),
            None => {}
        }
    }

    None
}

/// Sum of climbs between consecutive waypoints; descents contribute zero
fn altitude_gained(waypoints: &[&Waypoint]) -> i32 {
    waypoints
        .windows(2)
        .map(|pair| (pair[1].gps_altitude_m - pair[0].gps_altitude_m).max(0))
        .sum()
}

fn distance_traveled_km(waypoints: &[&Waypoint]) -> f64 {
    waypoints
        .windows(2)
        .map(|pair| {
            haversine_distance_km(
                pair[0].latitude,
                pair[0].longitude,
                pair[1].latitude,
                pair[1].longitude,
            )
        })
        .sum()
}
