//! Common test utilities for pipeline integration tests
//!
//! Provides an IGC file writer for building fixtures, in-memory fakes for the
//! aircraft directory and live tracking, and a [`TestPipeline`] that wires
//! them to a temporary file store and an in-memory flight store.
//!
//! # Usage
//!
//! ```no_run
//! use common::{TestPipeline, IgcFixture};
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let test = TestPipeline::new();
//!     let bytes = IgcFixture::tow_climb("HB-1234", date, start).render();
//!     // Temporary storage is removed when `test` goes out of scope
//! }
//! ```

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Timelike, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use towlog::aircraft::Classification;
use towlog::ddb::AircraftDirectory;
use towlog::file_store::LocalFileStore;
use towlog::flights_repo::LocalFlightStore;
use towlog::live_tracking::LiveTrackingSource;
use towlog::pipeline::IngestionPipeline;

/// Altitudes of an aerotow: climb on tow, release at index 6, then a thermal
pub const TOW_CLIMB_ALTITUDES: [i32; 14] = [
    400, 450, 500, 550, 600, 650, 640, 620, 600, 610, 650, 700, 690, 720,
];

/// One fix of a fixture file
#[derive(Debug, Clone, Copy)]
pub struct FixtureFix {
    pub time: NaiveTime,
    pub latitude: f64,
    pub longitude: f64,
    pub gps_altitude_m: i32,
}

/// Builder for IGC file contents
#[derive(Debug, Clone)]
pub struct IgcFixture {
    pub header_date: NaiveDate,
    pub registration: String,
    pub model: String,
    pub fixes: Vec<FixtureFix>,
}

impl IgcFixture {
    /// Fixes one minute apart, starting at `start`, following `altitudes`
    /// while drifting north-east
    pub fn with_altitudes(
        registration: &str,
        header_date: NaiveDate,
        start: NaiveTime,
        altitudes: &[i32],
    ) -> Self {
        let fixes = altitudes
            .iter()
            .enumerate()
            .map(|(i, &gps_altitude_m)| FixtureFix {
                time: start + TimeDelta::minutes(i as i64),
                latitude: 47.2 + i as f64 * 0.001,
                longitude: 8.2 + i as f64 * 0.001,
                gps_altitude_m,
            })
            .collect();
        Self {
            header_date,
            registration: registration.to_string(),
            model: "ASK 21".to_string(),
            fixes,
        }
    }

    /// A full aerotow flight following [`TOW_CLIMB_ALTITUDES`]
    pub fn tow_climb(registration: &str, header_date: NaiveDate, start: NaiveTime) -> Self {
        Self::with_altitudes(registration, header_date, start, &TOW_CLIMB_ALTITUDES)
    }

    pub fn render(&self) -> Vec<u8> {
        let mut igc = String::new();
        igc.push_str("AXXXTOWLOG\r\n");
        igc.push_str(&format!("HFDTE{}\r\n", self.header_date.format("%d%m%y")));
        igc.push_str(&format!("HFGTYGLIDERTYPE:{}\r\n", self.model));
        igc.push_str(&format!("HFGIDGLIDERID:{}\r\n", self.registration));
        for fix in &self.fixes {
            write_b_record(&mut igc, fix);
        }
        igc.into_bytes()
    }
}

/// B record: time, position, validity, pressure altitude, GPS altitude
fn write_b_record(igc: &mut String, fix: &FixtureFix) {
    igc.push_str(&format!(
        "B{:02}{:02}{:02}{}{}A{:05}{:05}\r\n",
        fix.time.hour(),
        fix.time.minute(),
        fix.time.second(),
        format_latitude(fix.latitude),
        format_longitude(fix.longitude),
        fix.gps_altitude_m,
        fix.gps_altitude_m
    ));
}

/// Format latitude as DDMMmmmN/S
fn format_latitude(lat: f64) -> String {
    let (degrees, minutes, thousandths) = split_minutes(lat);
    let hemisphere = if lat >= 0.0 { 'N' } else { 'S' };
    format!("{:02}{:02}{:03}{}", degrees, minutes, thousandths, hemisphere)
}

/// Format longitude as DDDMMmmmE/W
fn format_longitude(lon: f64) -> String {
    let (degrees, minutes, thousandths) = split_minutes(lon);
    let hemisphere = if lon >= 0.0 { 'E' } else { 'W' };
    format!("{:03}{:02}{:03}{}", degrees, minutes, thousandths, hemisphere)
}

/// Whole degrees, whole minutes and thousandths of a minute
fn split_minutes(value: f64) -> (u64, u64, u64) {
    let milli_minutes = (value.abs() * 60_000.0).round() as u64;
    (
        milli_minutes / 60_000,
        (milli_minutes % 60_000) / 1000,
        milli_minutes % 1000,
    )
}

/// Aircraft directory answering from a fixed table. Registrations missing
/// from the table fail, like a DDB miss.
#[derive(Default)]
pub struct FakeDirectory {
    entries: HashMap<String, Classification>,
    calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn with(mut self, registration: &str, classification: Classification) -> Self {
        self.entries.insert(registration.to_string(), classification);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AircraftDirectory for FakeDirectory {
    async fn classify(&self, registration: &str) -> Result<Classification> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entries
            .get(registration)
            .copied()
            .ok_or_else(|| anyhow!("Registration {} not found", registration))
    }
}

/// Live tracking serving logs registered per tracker
#[derive(Default)]
pub struct FakeLiveSource {
    logs: Mutex<HashMap<String, Vec<u8>>>,
    calls: AtomicUsize,
}

impl FakeLiveSource {
    pub fn serve(&self, tracker_id: &str, bytes: Vec<u8>) {
        self.logs
            .lock()
            .unwrap()
            .insert(tracker_id.to_string(), bytes);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveTrackingSource for FakeLiveSource {
    async fn download(
        &self,
        tracker_id: &str,
        _window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.logs
            .lock()
            .unwrap()
            .get(tracker_id)
            .cloned()
            .ok_or_else(|| anyhow!("No log for tracker {}", tracker_id))
    }
}

/// Pipeline over a temporary file store, an in-memory flight store and fakes
pub struct TestPipeline {
    pub pipeline: IngestionPipeline,
    pub flights: Arc<LocalFlightStore>,
    pub files: Arc<LocalFileStore>,
    pub directory: Arc<FakeDirectory>,
    pub live: Arc<FakeLiveSource>,
    _storage: TempDir,
}

impl TestPipeline {
    /// Pipeline whose directory knows the gliders `HB-1234` and `HB-5678`
    /// and the tow plane `D-EFGH`
    pub fn new() -> Self {
        Self::with_directory(
            FakeDirectory::default()
                .with("HB-1234", Classification::Glider)
                .with("HB-5678", Classification::Glider)
                .with("D-EFGH", Classification::TowPlane),
        )
    }

    pub fn with_directory(directory: FakeDirectory) -> Self {
        let storage = tempfile::tempdir().expect("Failed to create temp dir");
        let flights = Arc::new(LocalFlightStore::in_memory());
        let files = Arc::new(LocalFileStore::new(storage.path()));
        let directory = Arc::new(directory);
        let live = Arc::new(FakeLiveSource::default());

        let pipeline = IngestionPipeline::new(
            flights.clone(),
            files.clone(),
            directory.clone(),
            live.clone(),
        );
        Self {
            pipeline,
            flights,
            files,
            directory,
            live,
            _storage: storage,
        }
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn time(hour: u32, minute: u32, second: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, second).unwrap()
}
