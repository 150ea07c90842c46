//! Aircraft classification from the OGN device database (DDB)
//!
//! The DDB lists every registered tracker together with the registration and
//! the aircraft category of the airframe carrying it. Only the category is
//! used here: gliders are told apart from the powered aircraft towing them.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use tokio::sync::OnceCell;
use tracing::info;

use crate::aircraft::Classification;

pub const DDB_URL: &str = "http://ddb.glidernet.org/download/?j=1";

/// Classifies aircraft as glider or tow plane by registration
#[async_trait]
pub trait AircraftDirectory: Send + Sync {
    /// Classify the aircraft registered as `registration`. An error means the
    /// directory could not tell; callers treat that as unknown.
    async fn classify(&self, registration: &str) -> Result<Classification>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceType {
    Flarm,
    Ogn,
    Icao,
    Unknown,
}

impl<'de> Deserialize<'de> for DeviceType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "F" => DeviceType::Flarm,
            "O" => DeviceType::Ogn,
            "I" => DeviceType::Icao,
            _ => DeviceType::Unknown,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Device {
    pub device_type: DeviceType,
    pub device_id: String,
    pub aircraft_model: String,
    pub registration: String,
    #[serde(rename = "cn")]
    pub competition_number: String,

    /// DDB aircraft category: 1 glider, 2 plane, 3 ultralight, 4 helicopter,
    /// 5 drone, 6 other
    #[serde(default)]
    pub aircraft_type: String,
}

impl Device {
    pub fn classification(&self) -> Classification {
        match self.aircraft_type.trim() {
            "1" => Classification::Glider,
            "2" | "3" | "4" | "5" | "6" => Classification::TowPlane,
            _ => Classification::Unknown,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeviceResponse {
    devices: Vec<Device>,
}

/// Index of devices by normalized registration
#[derive(Debug, Default)]
pub struct DeviceDatabase {
    devices: HashMap<String, Device>,
}

impl DeviceDatabase {
    pub fn from_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        let devices = devices
            .into_iter()
            .filter(|d| !d.registration.trim().is_empty())
            .map(|d| (normalize_registration(&d.registration), d))
            .collect();
        Self { devices }
    }

    pub fn from_json(body: &str) -> Result<Self> {
        let response: DeviceResponse = serde_json::from_str(body)?;
        Ok(Self::from_devices(response.devices))
    }

    pub fn get_by_registration(&self, registration: &str) -> Option<&Device> {
        self.devices.get(&normalize_registration(registration))
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

/// Registrations are compared case-insensitively and without separators,
/// so "HB-1234", "hb1234" and "HB 1234" are the same aircraft
fn normalize_registration(registration: &str) -> String {
    registration
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Directory backed by the DDB, downloaded once on first use
pub struct DdbDirectory {
    client: reqwest::Client,
    url: String,
    database: OnceCell<DeviceDatabase>,
}

impl DdbDirectory {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self {
            client,
            url,
            database: OnceCell::new(),
        }
    }

    /// Directory over an already loaded database (no network access)
    pub fn preloaded(database: DeviceDatabase) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: DDB_URL.to_string(),
            database: OnceCell::new_with(Some(database)),
        }
    }

    async fn database(&self) -> Result<&DeviceDatabase> {
        self.database
            .get_or_try_init(|| async {
                let body = self
                    .client
                    .get(&self.url)
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await?;
                let database = DeviceDatabase::from_json(&body)?;
                info!(
                    "Loaded {} devices from {}",
                    database.device_count(),
                    self.url
                );
                Ok::<DeviceDatabase, anyhow::Error>(database)
            })
            .await
    }
}

#[async_trait]
impl AircraftDirectory for DdbDirectory {
    async fn classify(&self, registration: &str) -> Result<Classification> {
        let database = self.database().await?;
        let device = database
            .get_by_registration(registration)
            .ok_or_else(|| anyhow!("Registration {} not found in device database", registration))?;
        match device.classification() {
            Classification::Unknown => Err(anyhow!(
                "Device database has no aircraft category for {}",
                registration
            )),
            classification => Ok(classification),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"devices":[
        {"device_type":"F","device_id":"DD1234","aircraft_model":"ASK 21","registration":"HB-1234","cn":"K2","tracked":"Y","identified":"Y","aircraft_type":"1"},
        {"device_type":"O","device_id":"3F1A2B","aircraft_model":"Piper Pawnee","registration":"D-EFGH","cn":"","tracked":"Y","identified":"Y","aircraft_type":"2"},
        {"device_type":"I","device_id":"4B0001","aircraft_model":"Unknown","registration":"HB-XYZ","cn":"","tracked":"Y","identified":"Y"}
    ]}"#;

    #[test]
    fn test_device_type_deserialization() {
        let device: Device = serde_json::from_str(
            r#"{"device_type":"F","device_id":"DD1234","aircraft_model":"ASK 21","registration":"HB-1234","cn":"K2"}"#,
        )
        .unwrap();
        assert_eq!(device.device_type, DeviceType::Flarm);
        assert_eq!(device.aircraft_type, "");
        assert_eq!(device.classification(), Classification::Unknown);

        let device: Device = serde_json::from_str(
            r#"{"device_type":"X","device_id":"DD1234","aircraft_model":"","registration":"","cn":""}"#,
        )
        .unwrap();
        assert_eq!(device.device_type, DeviceType::Unknown);
    }

    #[test]
    fn test_lookup_normalizes_registration() {
        let database = DeviceDatabase::from_json(SAMPLE).unwrap();
        assert_eq!(database.device_count(), 3);
        assert_eq!(
            database.get_by_registration("hb 1234").unwrap().device_id,
            "DD1234"
        );
    }

    #[tokio::test]
    async fn test_classify() {
        let directory = DdbDirectory::preloaded(DeviceDatabase::from_json(SAMPLE).unwrap());

        assert_eq!(
            directory.classify("HB-1234").await.unwrap(),
            Classification::Glider
        );
        assert_eq!(
            directory.classify("D-EFGH").await.unwrap(),
            Classification::TowPlane
        );
        assert!(directory.classify("HB-XYZ").await.is_err());
        assert!(directory.classify("N12345").await.is_err());
    }
}
