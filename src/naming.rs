//! Storage naming for raw flight logs
//!
//! Logs are stored under `YYYY/MM/DD/<airfield>/` as
//! `<YYYY-MM-DD>_<registration>.<trackerId>[_<NN>].igc`. The optional suffix,
//! at least two digits, keeps several logs of the same tracker on the same day
//! apart; it is derived from the files already present at save time rather
//! than stored. Tracker ids are hex and compared in upper case.

use anyhow::Result;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::file_store::FileStore;

/// `2024-06-01_HB-1234.DD1234_01.igc`
static FILE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?P<date>\d{4}-\d{2}-\d{2})_(?P<registration>.+)\.(?P<tracker>[^._]+)(?:_(?P<suffix>\d{2,}))?\.igc$",
    )
    .unwrap()
});

/// Identity recovered from a stored file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFileName {
    pub date: NaiveDate,
    pub registration: String,
    pub tracker_id: String,
    pub suffix: Option<u32>,
}

/// Directory holding a day's logs for an airfield, with a trailing slash
pub fn storage_dir(date: NaiveDate, airfield: &str) -> String {
    format!("{}/{}/", date.format("%Y/%m/%d"), airfield)
}

/// File name for a log; `existing` is the number of logs already stored for
/// this tracker on this day
pub fn file_name(date: NaiveDate, registration: &str, tracker_id: &str, existing: usize) -> String {
    let suffix = if existing > 0 {
        format!("_{:02}", existing)
    } else {
        String::new()
    };
    format!(
        "{}_{}.{}{}.igc",
        date.format("%Y-%m-%d"),
        path_safe(registration),
        tracker_id,
        suffix
    )
}

/// Registrations end up in a path; separators and blanks become dashes
fn path_safe(registration: &str) -> String {
    registration
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_whitespace() { '-' } else { c })
        .collect()
}

/// Recover date, registration and tracker id from a file name. The tracker
/// id comes back in upper case. Returns `None` for names that do not follow
/// the pattern.
pub fn parse_file_name(name: &str) -> Option<StoredFileName> {
    let captures = FILE_NAME_RE.captures(name)?;
    let date = NaiveDate::parse_from_str(&captures["date"], "%Y-%m-%d").ok()?;
    let suffix = match captures.name("suffix") {
        Some(m) => Some(m.as_str().parse().ok()?),
        None => None,
    };
    Some(StoredFileName {
        date,
        registration: captures["registration"].to_string(),
        tracker_id: captures["tracker"].to_ascii_uppercase(),
        suffix,
    })
}

/// Whether `name` is a log of `tracker_id` recorded on `date`
pub fn is_log_of(name: &str, tracker_id: &str, date: NaiveDate) -> bool {
    parse_file_name(name)
        .is_some_and(|parsed| parsed.date == date && parsed.tracker_id.eq_ignore_ascii_case(tracker_id))
}

/// Pick a free path for a new log, counting the logs of the same tracker
/// already stored for that day. Returns `(directory, file name)`.
pub async fn next_storage_path(
    files: &dyn FileStore,
    date: NaiveDate,
    airfield: &str,
    registration: &str,
    tracker_id: &str,
) -> Result<(String, String)> {
    let dir = storage_dir(date, airfield);
    let existing = files
        .list(&dir)
        .await?
        .iter()
        .filter(|name| is_log_of(name, tracker_id, date))
        .count();
    Ok((dir, file_name(date, registration, tracker_id, existing)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_storage_dir() {
        assert_eq!(storage_dir(date(), "LSZF"), "2024/06/01/LSZF/");
    }

    #[test]
    fn test_file_name_without_suffix() {
        assert_eq!(
            file_name(date(), "HB-1234", "DD1234", 0),
            "2024-06-01_HB-1234.DD1234.igc"
        );
    }

    #[test]
    fn test_file_name_with_suffix() {
        assert_eq!(
            file_name(date(), "HB-1234", "DD1234", 1),
            "2024-06-01_HB-1234.DD1234_01.igc"
        );
        assert_eq!(
            file_name(date(), "HB-1234", "DD1234", 12),
            "2024-06-01_HB-1234.DD1234_12.igc"
        );
    }

    #[test]
    fn test_parse_file_name() {
        let parsed = parse_file_name("2024-06-01_HB-1234.DD1234_03.igc").unwrap();
        assert_eq!(parsed.date, date());
        assert_eq!(parsed.registration, "HB-1234");
        assert_eq!(parsed.tracker_id, "DD1234");
        assert_eq!(parsed.suffix, Some(3));

        let parsed = parse_file_name("2024-06-01_D.KXYZ.ABCDEF.IGC").unwrap();
        assert_eq!(parsed.registration, "D.KXYZ");
        assert_eq!(parsed.tracker_id, "ABCDEF");
        assert_eq!(parsed.suffix, None);
    }

    #[test]
    fn test_parse_generated_name() {
        let name = file_name(date(), "HB-3407", "3F1A2B", 2);
        let parsed = parse_file_name(&name).unwrap();
        assert_eq!(parsed.tracker_id, "3F1A2B");
        assert_eq!(parsed.registration, "HB-3407");
        assert_eq!(parsed.suffix, Some(2));
    }

    #[test]
    fn test_unrecognized_names() {
        assert_eq!(parse_file_name("flight.igc"), None);
        assert_eq!(parse_file_name("2024-06-01_HB-1234.igc"), None);
        assert_eq!(parse_file_name("2024-13-01_HB-1234.DD1234.igc"), None);
        assert_eq!(parse_file_name("2024-06-01_HB-1234.DD1234.txt"), None);
    }

    #[test]
    fn test_parse_normalizes_tracker_case() {
        let parsed = parse_file_name("2024-06-01_hb-1234.dd1234.igc").unwrap();
        assert_eq!(parsed.tracker_id, "DD1234");
        assert_eq!(parsed.registration, "hb-1234");
    }

    #[test]
    fn test_suffix_beyond_two_digits() {
        let name = file_name(date(), "HB-1234", "DD1234", 100);
        assert_eq!(name, "2024-06-01_HB-1234.DD1234_100.igc");
        assert_eq!(parse_file_name(&name).unwrap().suffix, Some(100));
        assert!(is_log_of(&name, "DD1234", date()));
    }

    #[test]
    fn test_is_log_of() {
        assert!(is_log_of("2024-06-01_HB-1234.DD1234_01.igc", "dd1234", date()));
        assert!(!is_log_of("2024-06-01_HB-1234.DD1234.igc", "DD9999", date()));
        assert!(!is_log_of(
            "2024-06-02_HB-1234.DD1234.igc",
            "DD1234",
            date()
        ));
    }
}
