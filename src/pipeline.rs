//! Flight log ingestion
//!
//! Every entry point (live-tracking download, re-read from storage, direct
//! upload) ends in the same procedure:
//!
//! 1. fetch the flights already recorded for the flight's UTC day
//! 2. resolve the aircraft for the tracker, classifying it on first sighting
//! 3. reject the flight if the aircraft already has one with the same start
//! 4. compute statistics
//! 5. link glider and tow plane flights that started together
//! 6. persist the flight, the tow link and the statistics
//!
//! Failures from step 4 on are handled according to the entry point's
//! [`ErrorPolicy`]: background triggers log and skip, uploads propagate.
//! Runs touching the same day are serialized through [`DayLocks`] so the
//! day's snapshot read in step 1 stays valid until the run has written.

use chrono::{NaiveDate, NaiveTime, TimeDelta};
use dashmap::DashMap;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::aircraft::{Aircraft, Classification, NewAircraft};
use crate::correlation::{TowLink, closest_flight, correlate, find_duplicate};
use crate::ddb::AircraftDirectory;
use crate::errors::{IngestError, IngestResult};
use crate::file_store::FileStore;
use crate::flights::{Flight, FlightEvent, FlightStatistics};
use crate::flights_repo::FlightStore;
use crate::igc::{ParsedFlight, parse_igc};
use crate::live_tracking::LiveTrackingSource;
use crate::naming::{next_storage_path, parse_file_name, storage_dir};
use crate::statistics::{self, MIN_WAYPOINTS};

/// What to do with a failure once the flight has been accepted for analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Return the error to the caller
    Propagate,
    /// Log the error with its context and abandon the file
    LogAndSkip,
}

impl ErrorPolicy {
    fn settle(
        self,
        result: IngestResult<IngestOutcome>,
        tracker_id: &str,
        airfield: &str,
        flight_date: NaiveDate,
    ) -> IngestResult<Option<IngestOutcome>> {
        match (self, result) {
            (_, Ok(outcome)) => Ok(Some(outcome)),
            (ErrorPolicy::Propagate, Err(e)) => Err(e),
            (ErrorPolicy::LogAndSkip, Err(e)) => {
                error!(
                    "Abandoning flight of tracker {} at {} on {}: {}",
                    tracker_id, airfield, flight_date, e
                );
                counter!("ingest.abandoned_total", "reason" => e.kind()).increment(1);
                Ok(None)
            }
        }
    }
}

/// Result of a successful ingestion
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub flight_id: Uuid,
    pub aircraft_id: Uuid,
    pub tracker_id: String,
    pub classification: Classification,
    pub source_filename: String,
    pub tow_link: Option<TowLink>,
    pub statistics: FlightStatistics,
}

/// A file submitted for upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Per-file result of a batch upload
#[derive(Debug)]
pub struct BatchEntry {
    pub filename: String,
    pub result: IngestResult<IngestOutcome>,
}

type LockMap = DashMap<NaiveDate, Arc<Mutex<()>>>;

/// One async mutex per UTC flight day. A day's entry lives only while a run
/// holds or awaits its lock.
#[derive(Debug, Clone, Default)]
pub struct DayLocks {
    locks: Arc<LockMap>,
}

impl DayLocks {
    pub async fn lock(&self, date: NaiveDate) -> DayGuard {
        let mutex = self.locks.entry(date).or_default().clone();
        let guard = mutex.lock_owned().await;
        DayGuard {
            date,
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }
}

/// Holds a day's lock; releasing it drops the day's entry when nobody else
/// is waiting
#[derive(Debug)]
pub struct DayGuard {
    date: NaiveDate,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DayGuard {
    fn drop(&mut self) {
        // The guard owns a reference to the mutex; release it before counting
        drop(self.guard.take());
        self.locks
            .remove_if(&self.date, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// A flight that passed deduplication and awaits analysis
struct Accepted {
    aircraft: Aircraft,
    flight: Flight,
    day_flights: Vec<Flight>,
}

pub struct IngestionPipeline {
    flights: Arc<dyn FlightStore>,
    files: Arc<dyn FileStore>,
    directory: Arc<dyn AircraftDirectory>,
    live_tracking: Arc<dyn LiveTrackingSource>,
    day_locks: DayLocks,
}

impl IngestionPipeline {
    pub fn new(
        flights: Arc<dyn FlightStore>,
        files: Arc<dyn FileStore>,
        directory: Arc<dyn AircraftDirectory>,
        live_tracking: Arc<dyn LiveTrackingSource>,
    ) -> Self {
        Self {
            flights,
            files,
            directory,
            live_tracking,
            day_locks: DayLocks::default(),
        }
    }

    /// Download the tracker's log from live tracking, store it and ingest it.
    /// Failures after deduplication are logged and yield `Ok(None)`.
    #[instrument(skip(self))]
    pub async fn download_and_process(
        &self,
        airfield: &str,
        tracker_id: &str,
    ) -> IngestResult<Option<IngestOutcome>> {
        let bytes = self.live_tracking.download(tracker_id, None).await?;
        let parsed = parse_igc(&bytes)?;
        let tracker_id = tracker_id.to_ascii_uppercase();
        let flight_date = parsed.flight_date;

        let _day = self.day_locks.lock(flight_date).await;
        let source_filename = self.store_raw(&parsed, airfield, &tracker_id, &bytes).await?;
        let result = self.ingest(parsed, &tracker_id, source_filename).await?;
        ErrorPolicy::LogAndSkip.settle(result, &tracker_id, airfield, flight_date)
    }

    /// Ingest a log already in storage. Failures after deduplication are
    /// logged and yield `Ok(None)`.
    #[instrument(skip(self))]
    pub async fn read_and_process(
        &self,
        airfield: &str,
        filename: &str,
    ) -> IngestResult<Option<IngestOutcome>> {
        let stored = parse_file_name(filename)
            .ok_or_else(|| IngestError::format(format!("unrecognized file name {}", filename)))?;
        let dir = storage_dir(stored.date, airfield);
        let bytes = self
            .files
            .read(&dir, filename)
            .await?
            .ok_or_else(|| IngestError::NotFound(format!("{}{}", dir, filename)))?;
        let parsed = parse_igc(&bytes)?;
        let flight_date = parsed.flight_date;

        let _day = self.day_locks.lock(flight_date).await;
        let result = self
            .ingest(parsed, &stored.tracker_id, filename.to_string())
            .await?;
        ErrorPolicy::LogAndSkip.settle(result, &stored.tracker_id, airfield, flight_date)
    }

    /// Store and ingest an uploaded log. Every failure is returned to the
    /// caller, so `Ok(None)` never comes back from this path.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_and_process(
        &self,
        filename: &str,
        bytes: &[u8],
        airfield: &str,
    ) -> IngestResult<Option<IngestOutcome>> {
        let parsed = parse_igc(bytes)?;
        let tracker_id = parse_file_name(filename)
            .map(|stored| stored.tracker_id)
            .ok_or_else(|| IngestError::format(format!("unrecognized file name {}", filename)))?;
        let flight_date = parsed.flight_date;

        let _day = self.day_locks.lock(flight_date).await;
        let source_filename = self.store_raw(&parsed, airfield, &tracker_id, bytes).await?;
        let result = self.ingest(parsed, &tracker_id, source_filename).await?;
        ErrorPolicy::Propagate.settle(result, &tracker_id, airfield, flight_date)
    }

    /// Upload files one after another. A failing file is logged and reported
    /// without stopping the batch.
    pub async fn upload_batch(&self, airfield: &str, files: Vec<UploadedFile>) -> Vec<BatchEntry> {
        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let result = self
                .upload_and_process(&file.filename, &file.bytes, airfield)
                .await
                .and_then(|outcome| {
                    outcome.ok_or_else(|| {
                        IngestError::NotFound(format!("no outcome for {}", file.filename))
                    })
                });
            if let Err(e) = &result {
                warn!("Upload of {} failed: {}", file.filename, e);
            }
            entries.push(BatchEntry {
                filename: file.filename,
                result,
            });
        }
        entries
    }

    /// Recompute and replace the statistics of a stored flight
    #[instrument(skip(self))]
    pub async fn recalculate_statistics(&self, flight_id: Uuid) -> IngestResult<FlightStatistics> {
        let mut flight = self
            .flights
            .get_flight(flight_id)
            .await?
            .ok_or_else(|| IngestError::NotFound(format!("flight {}", flight_id)))?;

        flight.waypoints.sort_by_key(|w| w.timestamp);
        let statistics = statistics::analyze(&flight.waypoints)?;
        if !self.flights.upsert_statistics(flight_id, &statistics).await? {
            return Err(IngestError::NotFound(format!("flight {}", flight_id)));
        }

        info!("Recalculated statistics for flight {}", flight_id);
        Ok(statistics)
    }

    /// Save the raw bytes under the next free name for this tracker and day
    async fn store_raw(
        &self,
        parsed: &ParsedFlight,
        airfield: &str,
        tracker_id: &str,
        bytes: &[u8],
    ) -> IngestResult<String> {
        let (dir, name) = next_storage_path(
            self.files.as_ref(),
            parsed.flight_date,
            airfield,
            &parsed.aircraft_registration,
            tracker_id,
        )
        .await?;
        self.files.save(&dir, &name, bytes).await?;
        info!("Stored raw log as {}{}", dir, name);
        Ok(name)
    }

    /// Run the shared procedure. The outer result carries failures up to and
    /// including deduplication, which always propagate; the inner result
    /// carries failures from analysis on, left to the caller's policy.
    async fn ingest(
        &self,
        parsed: ParsedFlight,
        tracker_id: &str,
        source_filename: String,
    ) -> IngestResult<IngestResult<IngestOutcome>> {
        let accepted = self.accept(parsed, tracker_id, source_filename).await?;
        Ok(self.commit(accepted, tracker_id).await)
    }

    async fn accept(
        &self,
        parsed: ParsedFlight,
        tracker_id: &str,
        source_filename: String,
    ) -> IngestResult<Accepted> {
        if parsed.waypoints.is_empty() {
            return Err(IngestError::InsufficientData {
                count: 0,
                required: MIN_WAYPOINTS,
            });
        }

        let day_start = parsed.flight_date.and_time(NaiveTime::MIN).and_utc();
        let day_end = day_start + TimeDelta::days(1);
        let day_flights = self.flights.flights_between(day_start, day_end).await?;
        debug!(
            "{} flights already recorded on {}",
            day_flights.len(),
            parsed.flight_date
        );

        let aircraft = self.resolve_aircraft(tracker_id, &parsed).await?;

        let Some(flight) = Flight::from_waypoints(aircraft.id, source_filename, parsed.waypoints)
        else {
            return Err(IngestError::InsufficientData {
                count: 0,
                required: MIN_WAYPOINTS,
            });
        };

        if let Some(existing) = find_duplicate(&day_flights, aircraft.id, flight.start_time) {
            warn!(
                "Tracker {} already has flight {} starting at {}",
                tracker_id, existing.id, flight.start_time
            );
            counter!("ingest.duplicates_total").increment(1);
            return Err(IngestError::DuplicateFlight {
                tracker_id: tracker_id.to_string(),
                start_time: flight.start_time,
            });
        }

        Ok(Accepted {
            aircraft,
            flight,
            day_flights,
        })
    }

    async fn commit(&self, accepted: Accepted, tracker_id: &str) -> IngestResult<IngestOutcome> {
        let Accepted {
            aircraft,
            mut flight,
            day_flights,
        } = accepted;

        let statistics = statistics::analyze(&flight.waypoints)?;
        if let Some(release_time) = statistics.release_time {
            flight.mark_event(release_time, FlightEvent::TowRelease);
        }

        let classification = aircraft.classification();
        let tow_link = correlate(&day_flights, flight.start_time, classification);
        match tow_link {
            Some(TowLink::TowedBy { tow_flight_id }) => {
                info!("Glider {} towed by flight {}", tracker_id, tow_flight_id);
                flight.tow_flight_id = Some(tow_flight_id);
            }
            Some(TowLink::Towed { glider_flight_id }) => {
                info!("Tow plane {} towed flight {}", tracker_id, glider_flight_id);
            }
            None => {
                if let Some((matched, gap)) = closest_flight(&day_flights, flight.start_time) {
                    debug!(
                        "No tow link for {} ({}): closest flight {} started {}s apart",
                        tracker_id,
                        classification,
                        matched.id,
                        gap.num_seconds()
                    );
                }
            }
        }

        self.flights.insert_flight(&flight).await?;
        counter!("ingest.flights_created_total").increment(1);

        if let Some(TowLink::Towed { glider_flight_id }) = tow_link {
            if !self
                .flights
                .update_tow_flight(glider_flight_id, flight.id)
                .await?
            {
                return Err(IngestError::NotFound(format!("flight {}", glider_flight_id)));
            }
        }
        if tow_link.is_some() {
            counter!("ingest.tow_links_total").increment(1);
        }

        if !self.flights.upsert_statistics(flight.id, &statistics).await? {
            return Err(IngestError::NotFound(format!("flight {}", flight.id)));
        }

        info!(
            "Recorded flight {} for {} from {} to {} ({} waypoints)",
            flight.id,
            tracker_id,
            flight.start_time,
            flight.end_time,
            flight.waypoints.len()
        );

        Ok(IngestOutcome {
            flight_id: flight.id,
            aircraft_id: aircraft.id,
            tracker_id: tracker_id.to_string(),
            classification,
            source_filename: flight.source_filename,
            tow_link,
            statistics,
        })
    }

    /// Find the aircraft carrying `tracker_id`, creating it on first sighting.
    /// Classification happens only then; a failed lookup is stored as unknown
    /// and never retried.
    async fn resolve_aircraft(
        &self,
        tracker_id: &str,
        parsed: &ParsedFlight,
    ) -> IngestResult<Aircraft> {
        if let Some(aircraft) = self.flights.find_aircraft_by_tracker(tracker_id).await? {
            return Ok(aircraft);
        }

        let classification = match self.directory.classify(&parsed.aircraft_registration).await {
            Ok(classification) => classification,
            Err(e) => {
                let unavailable = IngestError::ClassificationUnavailable(format!(
                    "{}: {:#}",
                    parsed.aircraft_registration, e
                ));
                warn!("{}; recording tracker {} as unknown", unavailable, tracker_id);
                Classification::Unknown
            }
        };

        info!(
            "First sighting of tracker {} ({}), classified as {}",
            tracker_id, parsed.aircraft_registration, classification
        );
        let aircraft = self
            .flights
            .create_aircraft(NewAircraft {
                tracker_id: tracker_id.to_string(),
                registration: parsed.aircraft_registration.clone(),
                description: parsed.aircraft_model.clone(),
                classification,
            })
            .await?;
        Ok(aircraft)
    }
}
