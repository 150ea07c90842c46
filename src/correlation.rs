use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::aircraft::Classification;
use crate::flights::Flight;

/// Start times closer than this many seconds are taken to be a glider and its
/// tow plane leaving together
pub const CORRELATION_THRESHOLD_SECONDS: i64 = 30;

/// Tow linkage decided for a newly ingested flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TowLink {
    /// The new glider flight was towed by an existing flight
    TowedBy { tow_flight_id: Uuid },

    /// The new tow-plane flight towed an existing flight
    Towed { glider_flight_id: Uuid },
}

/// The day's flight whose start is closest to `start_time`, with the gap
pub fn closest_flight(
    day_flights: &[Flight],
    start_time: DateTime<Utc>,
) -> Option<(&Flight, TimeDelta)> {
    day_flights
        .iter()
        .map(|f| (f, (f.start_time - start_time).abs()))
        .min_by_key(|(_, gap)| *gap)
}

/// Whether the day already has this aircraft's flight starting at `start_time`
pub fn find_duplicate(
    day_flights: &[Flight],
    aircraft_id: Uuid,
    start_time: DateTime<Utc>,
) -> Option<&Flight> {
    day_flights
        .iter()
        .find(|f| f.is_same_flight(aircraft_id, start_time))
}

/// Decide the tow link for a new flight
///
/// Only the single closest flight of the day is considered; it must start
/// strictly within [`CORRELATION_THRESHOLD_SECONDS`], and the new aircraft must have a
/// known classification.
pub fn correlate(
    day_flights: &[Flight],
    start_time: DateTime<Utc>,
    classification: Classification,
) -> Option<TowLink> {
    let (matched, gap) = closest_flight(day_flights, start_time)?;
    if gap >= TimeDelta::seconds(CORRELATION_THRESHOLD_SECONDS) {
        return None;
    }
    match classification {
        Classification::Glider => Some(TowLink::TowedBy {
            tow_flight_id: matched.id,
        }),
        Classification::TowPlane => Some(TowLink::Towed {
            glider_flight_id: matched.id,
        }),
        Classification::Unknown => None,
    }
}
