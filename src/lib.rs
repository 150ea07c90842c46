//! towlog - glider and tow-plane flight log ingestion
//!
//! Parses IGC flight logs, derives release and climb statistics, stores raw
//! logs under a predictable naming scheme and links glider flights to the tow
//! plane flights that launched them.

pub mod aircraft;
pub mod config;
pub mod correlation;
pub mod ddb;
pub mod delayed;
pub mod errors;
pub mod file_store;
pub mod flights;
pub mod flights_repo;
pub mod geometry;
pub mod igc;
pub mod live_tracking;
pub mod log_format;
pub mod metrics;
pub mod naming;
pub mod pipeline;
pub mod statistics;

pub use errors::{IngestError, IngestResult};
pub use pipeline::{IngestOutcome, IngestionPipeline};
