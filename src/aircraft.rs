use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Role of an aircraft in tow correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Glider,
    TowPlane,
    Unknown,
}

impl Classification {
    pub fn from_is_glider(is_glider: Option<bool>) -> Self {
        match is_glider {
            Some(true) => Classification::Glider,
            Some(false) => Classification::TowPlane,
            None => Classification::Unknown,
        }
    }

    pub fn is_glider(&self) -> Option<bool> {
        match self {
            Classification::Glider => Some(true),
            Classification::TowPlane => Some(false),
            Classification::Unknown => None,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Glider => write!(f, "glider"),
            Classification::TowPlane => write!(f, "tow plane"),
            Classification::Unknown => write!(f, "unknown"),
        }
    }
}

/// An aircraft identified by the tracker it carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aircraft {
    pub id: Uuid,

    /// Identifier broadcast by the tracking device (e.g. "DD1234")
    pub tracker_id: String,

    pub registration: String,

    /// Aircraft model as recorded in the flight log header
    pub description: String,

    /// Resolved once on first sighting; `None` when the lookup failed
    pub is_glider: Option<bool>,
}

/// Values needed to create an aircraft on first sighting
#[derive(Debug, Clone)]
pub struct NewAircraft {
    pub tracker_id: String,
    pub registration: String,
    pub description: String,
    pub classification: Classification,
}

impl Aircraft {
    pub fn classification(&self) -> Classification {
        Classification::from_is_glider(self.is_glider)
    }
}

impl From<NewAircraft> for Aircraft {
    fn from(new: NewAircraft) -> Self {
        Self {
            id: Uuid::now_v7(),
            tracker_id: new.tracker_id,
            registration: new.registration,
            description: new.description,
            is_glider: new.classification.is_glider(),
        }
    }
}
