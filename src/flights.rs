use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event tag attached to a single waypoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightEvent {
    /// The glider disconnected from its tow plane at this waypoint
    TowRelease,
}

/// A single timestamped position/altitude sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub timestamp: DateTime<Utc>,

    /// GPS altitude in meters, taken as recorded
    pub gps_altitude_m: i32,

    /// Decimal degrees rounded to 4 places
    pub latitude: f64,
    pub longitude: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_event: Option<FlightEvent>,
}

impl Waypoint {
    pub fn new(timestamp: DateTime<Utc>, gps_altitude_m: i32, latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp,
            gps_altitude_m,
            latitude,
            longitude,
            flight_event: None,
        }
    }
}

/// Statistics derived from a flight's waypoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightStatistics {
    /// GPS altitude at the detected tow release
    pub release_height_m: Option<i32>,

    /// Highest GPS altitude over the whole flight
    pub max_altitude_m: i32,

    /// Sum of climbs after release (descents count as zero)
    pub altitude_gained_m: Option<i32>,

    /// Great-circle distance covered after release
    pub distance_traveled_km: Option<f64>,

    /// Timestamp of the detected tow release
    pub release_time: Option<DateTime<Utc>>,
}

/// A recorded flight, as stored after ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flight {
    pub id: Uuid,

    /// Aircraft that flew this flight
    pub aircraft_id: Uuid,

    /// Tow-plane flight that towed this glider aloft
    pub tow_flight_id: Option<Uuid>,

    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    /// Name under which the raw log was stored
    pub source_filename: String,

    pub statistics: Option<FlightStatistics>,

    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
}

impl Flight {
    /// Build a flight from an ordered waypoint sequence. Returns `None` when
    /// there are no waypoints to take start and end times from.
    pub fn from_waypoints(
        aircraft_id: Uuid,
        source_filename: String,
        waypoints: Vec<Waypoint>,
    ) -> Option<Self> {
        let start_time = waypoints.first()?.timestamp;
        let end_time = waypoints.last()?.timestamp;
        Some(Self {
            id: Uuid::now_v7(),
            aircraft_id,
            tow_flight_id: None,
            start_time,
            end_time,
            source_filename,
            statistics: None,
            waypoints,
        })
    }

    /// Two flights are the same flight when the aircraft and start instant match
    pub fn is_same_flight(&self, aircraft_id: Uuid, start_time: DateTime<Utc>) -> bool {
        self.aircraft_id == aircraft_id && self.start_time == start_time
    }

    /// Tag the waypoint recorded at `timestamp` with `event`
    pub fn mark_event(&mut self, timestamp: DateTime<Utc>, event: FlightEvent) {
        for waypoint in self.waypoints.iter_mut() {
            if waypoint.flight_event == Some(event) {
                waypoint.flight_event = None;
            }
        }
        if let Some(waypoint) = self.waypoints.iter_mut().find(|w| w.timestamp == timestamp) {
            waypoint.flight_event = Some(event);
        }
    }
}
