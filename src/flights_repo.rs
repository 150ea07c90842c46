use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::aircraft::{Aircraft, NewAircraft};
use crate::flights::{Flight, FlightStatistics};

/// Persistence for aircraft, flights and their statistics
#[async_trait]
pub trait FlightStore: Send + Sync {
    /// Flights (any aircraft) starting within `[start, end)`, without waypoints
    async fn flights_between(&self, start: DateTime<Utc>, end: DateTime<Utc>)
    -> Result<Vec<Flight>>;

    async fn find_aircraft_by_tracker(&self, tracker_id: &str) -> Result<Option<Aircraft>>;

    /// Create an aircraft; returns the existing record if the tracker is
    /// already known
    async fn create_aircraft(&self, aircraft: NewAircraft) -> Result<Aircraft>;

    /// Insert a flight together with its waypoints
    async fn insert_flight(&self, flight: &Flight) -> Result<()>;

    /// Point `flight_id`'s tow reference at `tow_flight_id`. Returns false when
    /// the flight does not exist.
    async fn update_tow_flight(&self, flight_id: Uuid, tow_flight_id: Uuid) -> Result<bool>;

    /// Insert or replace the statistics of a flight. Returns false when the
    /// flight does not exist.
    async fn upsert_statistics(&self, flight_id: Uuid, statistics: &FlightStatistics)
    -> Result<bool>;

    /// A flight with its waypoints
    async fn get_flight(&self, flight_id: Uuid) -> Result<Option<Flight>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    aircraft: HashMap<String, Aircraft>,
    flights: HashMap<Uuid, Flight>,
}

/// In-process flight store, optionally persisted as a JSON snapshot that is
/// rewritten after every change
#[derive(Clone, Default)]
pub struct LocalFlightStore {
    state: Arc<RwLock<Snapshot>>,
    snapshot_path: Option<PathBuf>,
}

impl LocalFlightStore {
    /// Store that lives only in memory
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Store backed by a JSON file, loaded now if it exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse flight store {:?}", path))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        };
        debug!(
            "Opened flight store {:?} with {} flights",
            path,
            snapshot.flights.len()
        );
        Ok(Self {
            state: Arc::new(RwLock::new(snapshot)),
            snapshot_path: Some(path),
        })
    }

    /// Number of stored flights
    pub async fn flight_count(&self) -> usize {
        self.state.read().await.flights.len()
    }

    /// Write the snapshot (atomic: write to .tmp then rename)
    async fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents =
            serde_json::to_vec_pretty(snapshot).context("Failed to serialize flight store")?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &contents)
            .await
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .with_context(|| format!("Failed to rename {:?} to {:?}", tmp_path, path))?;
        Ok(())
    }
}

#[async_trait]
impl FlightStore for LocalFlightStore {
    async fn flights_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Flight>> {
        let state = self.state.read().await;
        let mut flights: Vec<Flight> = state
            .flights
            .values()
            .filter(|f| f.start_time >= start && f.start_time < end)
            .map(|f| Flight {
                waypoints: Vec::new(),
                ..f.clone()
            })
            .collect();
        flights.sort_by_key(|f| f.start_time);
        Ok(flights)
    }

    async fn find_aircraft_by_tracker(&self, tracker_id: &str) -> Result<Option<Aircraft>> {
        Ok(self.state.read().await.aircraft.get(tracker_id).cloned())
    }

    async fn create_aircraft(&self, aircraft: NewAircraft) -> Result<Aircraft> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.aircraft.get(&aircraft.tracker_id) {
            return Ok(existing.clone());
        }
        let aircraft: Aircraft = aircraft.into();
        state
            .aircraft
            .insert(aircraft.tracker_id.clone(), aircraft.clone());
        if let Err(e) = self.persist(&state).await {
            state.aircraft.remove(&aircraft.tracker_id);
            return Err(e);
        }
        Ok(aircraft)
    }

    async fn insert_flight(&self, flight: &Flight) -> Result<()> {
        let mut state = self.state.write().await;
        if state.flights.contains_key(&flight.id) {
            anyhow::bail!("Flight {} already exists", flight.id);
        }
        state.flights.insert(flight.id, flight.clone());
        if let Err(e) = self.persist(&state).await {
            state.flights.remove(&flight.id);
            return Err(e);
        }
        Ok(())
    }

    async fn update_tow_flight(&self, flight_id: Uuid, tow_flight_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(flight) = state.flights.get_mut(&flight_id) else {
            return Ok(false);
        };
        let previous = flight.tow_flight_id.replace(tow_flight_id);
        if let Err(e) = self.persist(&state).await {
            if let Some(flight) = state.flights.get_mut(&flight_id) {
                flight.tow_flight_id = previous;
            }
            return Err(e);
        }
        Ok(true)
    }

    async fn upsert_statistics(
        &self,
        flight_id: Uuid,
        statistics: &FlightStatistics,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(flight) = state.flights.get_mut(&flight_id) else {
            return Ok(false);
        };
        let previous = flight.statistics.replace(statistics.clone());
        if let Err(e) = self.persist(&state).await {
            if let Some(flight) = state.flights.get_mut(&flight_id) {
                flight.statistics = previous;
            }
            return Err(e);
        }
        Ok(true)
    }

    async fn get_flight(&self, flight_id: Uuid) -> Result<Option<Flight>> {
        Ok(self.state.read().await.flights.get(&flight_id).cloned())
    }
}
