//! IGC flight-recorder file parsing
//!
//! This module decodes the subset of the IGC (International Gliding Commission)
//! format needed to record a flight: a handful of H (header) records and the B
//! (fix) records carrying time, position and GPS altitude.
//!
//! Reference: https://xp-soaring.github.io/igc_file_format/igc_format_2008.html
//!
//! Two date quirks are absorbed here:
//! - B records only carry a time of day, so each fix inherits the date of the
//!   previous fix and rolls over to the next day when time jumps backwards by
//!   more than an hour.
//! - The HFDTE header holds the *landing* date. When the fixes cross midnight,
//!   every timestamp is shifted back one day so the flight is anchored on its
//!   takeoff date.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use tracing::debug;

use crate::errors::{IngestError, IngestResult};
use crate::flights::Waypoint;

const GLIDER_TYPE_KEY: &str = "GTYGLIDERTYPE:";
const GLIDER_ID_KEY: &str = "GIDGLIDERID:";
const COMPETITION_ID_KEY: &str = "CIDCOMPETITIONID:";
const DATE_KEY: &str = "DTE";

/// A flight decoded from an IGC file
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFlight {
    pub aircraft_model: String,
    pub aircraft_registration: String,
    pub contest_id: Option<String>,

    /// UTC takeoff date
    pub flight_date: NaiveDate,

    pub waypoints: Vec<Waypoint>,
}

/// A B record before its time of day is anchored to a date
#[derive(Debug, Clone, Copy, PartialEq)]
struct RawFix {
    time: NaiveTime,
    latitude: f64,
    longitude: f64,
    gps_altitude_m: i32,
}

/// Parse an IGC file into a flight
///
/// Fails with [`IngestError::Format`] when no valid date header was found or
/// the glider id header is missing or empty. Fix lines that cannot be sliced
/// at their fixed offsets are skipped.
pub fn parse_igc(bytes: &[u8]) -> IngestResult<ParsedFlight> {
    let content = String::from_utf8_lossy(bytes);

    let mut aircraft_model = String::new();
    let mut registration: Option<String> = None;
    let mut contest_id: Option<String> = None;
    let mut header_date: Option<NaiveDate> = None;
    let mut raw_fixes = Vec::new();

    for line in content.lines() {
        let line = line.trim_end_matches('\r');

        if line.starts_with('B') {
            match parse_b_record(line) {
                Some(fix) => raw_fixes.push(fix),
                None => debug!("Skipping malformed B record: {:?}", line),
            }
        } else if let Some(value) = header_value(line, GLIDER_TYPE_KEY) {
            aircraft_model = value.to_string();
        } else if let Some(value) = header_value(line, GLIDER_ID_KEY) {
            registration = Some(value.to_string());
        } else if let Some(value) = header_value(line, COMPETITION_ID_KEY) {
            contest_id = (!value.is_empty()).then(|| value.to_string());
        } else if let Some(value) = header_value(line, DATE_KEY) {
            if let Some(date) = parse_header_date(value) {
                header_date = Some(date);
            } else {
                debug!("Ignoring unparseable date header: {:?}", line);
            }
        }
    }

    let header_date =
        header_date.ok_or_else(|| IngestError::format("missing or invalid HFDTE date header"))?;
    let aircraft_registration = registration
        .filter(|r| !r.is_empty())
        .ok_or_else(|| IngestError::format("missing glider id header"))?;

    let (flight_date, waypoints) = anchor_fixes(header_date, &raw_fixes);

    Ok(ParsedFlight {
        aircraft_model,
        aircraft_registration,
        contest_id,
        flight_date,
        waypoints,
    })
}

/// Turn time-of-day fixes into absolute timestamps, then move the whole
/// flight back one day if it crossed midnight (the header holds the landing
/// date).
fn anchor_fixes(header_date: NaiveDate, raw_fixes: &[RawFix]) -> (NaiveDate, Vec<Waypoint>) {
    let mut previous: NaiveDateTime = header_date.and_time(NaiveTime::MIN);
    let mut timestamps = Vec::with_capacity(raw_fixes.len());

    for fix in raw_fixes {
        let mut timestamp = previous.date().and_time(fix.time);
        if timestamp < previous - TimeDelta::hours(1) {
            timestamp += TimeDelta::days(1);
        }
        timestamps.push(timestamp);
        previous = timestamp;
    }

    let crosses_midnight = match (timestamps.first(), timestamps.last()) {
        (Some(first), Some(last)) => first.date() != last.date(),
        _ => false,
    };

    let mut flight_date = header_date;
    if crosses_midnight {
        debug!(
            "Fixes cross midnight, anchoring flight on takeoff date instead of {}",
            header_date
        );
        flight_date = header_date - Days::new(1);
        for timestamp in timestamps.iter_mut() {
            *timestamp -= TimeDelta::days(1);
        }
    }

    let waypoints = raw_fixes
        .iter()
        .zip(timestamps)
        .map(|(fix, timestamp)| {
            Waypoint::new(
                DateTime::<Utc>::from_naive_utc_and_offset(timestamp, Utc),
                fix.gps_altitude_m,
                fix.latitude,
                fix.longitude,
            )
        })
        .collect();

    (flight_date, waypoints)
}

/// Return the trimmed value of an H record whose subtype matches `key`
///
/// H records are `H` + a one-letter source (`F` flight recorder, `P` pilot,
/// `O` observer) + the three-letter subtype.
fn header_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    if !line.starts_with('H') {
        return None;
    }
    line.get(2..)?.strip_prefix(key).map(str::trim)
}

/// Parse the date from `DDMMYY` or the newer `DATE:DDMMYY,NN` form
fn parse_header_date(value: &str) -> Option<NaiveDate> {
    let value = value.strip_prefix("DATE:").unwrap_or(value).trim();
    let digits = value.get(0..6)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day = digits[0..2].parse().ok()?;
    let month = digits[2..4].parse().ok()?;
    let year: i32 = digits[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}

/// Parse a B record using its fixed byte layout
///
/// Format: B HHMMSS DDMMmmmN DDDMMmmmE V PPPPP GGGGG
fn parse_b_record(line: &str) -> Option<RawFix> {
    let time = line.get(1..7)?;
    let hour = time.get(0..2)?.parse().ok()?;
    let minute = time.get(2..4)?.parse().ok()?;
    let second = time.get(4..6)?.parse().ok()?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;

    let latitude = parse_coordinate(line.get(7..15)?, 2)?;
    let longitude = parse_coordinate(line.get(15..24)?, 3)?;
    let gps_altitude_m = line.get(30..35)?.trim().parse().ok()?;

    Some(RawFix {
        time,
        latitude,
        longitude,
        gps_altitude_m,
    })
}

/// Decode `DDMMmmmH` (latitude, 2 degree digits) or `DDDMMmmmH` (longitude,
/// 3 degree digits) into decimal degrees rounded to 4 places
pub fn parse_coordinate(field: &str, degree_digits: usize) -> Option<f64> {
    if field.len() != degree_digits + 6 || !field.is_ascii() {
        return None;
    }
    let degrees: f64 = field[..degree_digits].parse().ok()?;
    let whole_minutes: f64 = field[degree_digits..degree_digits + 2].parse().ok()?;
    let minute_thousandths: f64 = field[degree_digits + 2..degree_digits + 5].parse().ok()?;
    let minutes = whole_minutes + minute_thousandths / 1000.0;

    let value = round_to(degrees + minutes / 60.0, 4);
    match &field[degree_digits + 5..] {
        "N" | "E" => Some(value),
        "S" | "W" => Some(-value),
        _ => None,
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
