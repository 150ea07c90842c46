use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while ingesting a flight log
#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed file contents or an unrecognized file name
    #[error("format error: {0}")]
    Format(String),

    /// The same aircraft already has a flight starting at this instant
    #[error("duplicate flight for tracker {tracker_id} starting at {start_time}")]
    DuplicateFlight {
        tracker_id: String,
        start_time: DateTime<Utc>,
    },

    /// Not enough waypoints to analyze the flight
    #[error("insufficient data: {count} waypoints, at least {required} required")]
    InsufficientData { count: usize, required: usize },

    /// A collaborator reported a missing entity
    #[error("not found: {0}")]
    NotFound(String),

    /// The aircraft directory could not classify an aircraft. Never escalated
    /// by the pipeline; it downgrades the classification to unknown.
    #[error("classification unavailable: {0}")]
    ClassificationUnavailable(String),

    /// Store, file system or network failure reported by a collaborator
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl IngestError {
    pub fn format(msg: impl Into<String>) -> Self {
        IngestError::Format(msg.into())
    }

    /// Short machine-friendly name, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Format(_) => "format",
            IngestError::DuplicateFlight { .. } => "duplicate",
            IngestError::InsufficientData { .. } => "insufficient_data",
            IngestError::NotFound(_) => "not_found",
            IngestError::ClassificationUnavailable(_) => "classification_unavailable",
            IngestError::Collaborator(_) => "collaborator",
        }
    }
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_duplicate_message_names_tracker() {
        let err = IngestError::DuplicateFlight {
            tracker_id: "DD1234".to_string(),
            start_time: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("DD1234"));
        assert!(msg.contains("2024-06-01 10:00:00"));
        assert_eq!(err.kind(), "duplicate");
    }

    #[test]
    fn test_collaborator_wraps_anyhow() {
        let err: IngestError = anyhow::anyhow!("connection refused").into();
        assert!(matches!(err, IngestError::Collaborator(_)));
        assert_eq!(err.to_string(), "connection refused");
    }
}
