use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ddb::DDB_URL;

/// Settings file structure. Every field has a default, so a missing or
/// partial file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Root directory for raw flight logs
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// JSON snapshot of aircraft and flights
    #[serde(default = "default_flight_store")]
    pub flight_store: PathBuf,

    #[serde(default = "default_live_tracking_url")]
    pub live_tracking_url: String,

    #[serde(default = "default_ddb_url")]
    pub ddb_url: String,

    /// Seconds between a webhook event and the download it triggers
    #[serde(default = "default_download_delay")]
    pub download_delay_secs: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Port for the Prometheus scrape endpoint; metrics stay in-process when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./flights")
}

fn default_flight_store() -> PathBuf {
    PathBuf::from("./flights/flights.json")
}

fn default_live_tracking_url() -> String {
    "https://live.glidernet.org".to_string()
}

fn default_ddb_url() -> String {
    DDB_URL.to_string()
}

fn default_download_delay() -> u64 {
    15 * 60
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            flight_store: default_flight_store(),
            live_tracking_url: default_live_tracking_url(),
            ddb_url: default_ddb_url(),
            download_delay_secs: default_download_delay(),
            http_timeout_secs: default_http_timeout(),
            metrics_port: None,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let settings: Settings =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(settings)
    }

    /// Load settings from `path`, or the defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn download_delay(&self) -> Duration {
        Duration::from_secs(self.download_delay_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Resolve the settings file path.
///
/// Priority:
/// 1. `TOWLOG_CONFIG` env var
/// 2. `./towlog.toml`
pub fn config_path() -> PathBuf {
    std::env::var("TOWLOG_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./towlog.toml"))
}
