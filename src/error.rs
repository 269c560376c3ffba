//! Recoverable error taxonomy for the tracking pipeline.
//!
//! None of these are fatal. Each is raised by the component that detects it
//! and converted into a degraded result at that component's boundary.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrackingError {
    /// The frame carried no recognizable segment at all.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// No GPS fix has been received since startup.
    #[error("no position fix available")]
    NoFixAvailable,

    /// Nothing to rank: the station snapshot is empty or the position is unknown.
    #[error("no station ranking available")]
    EmptyStationCatalog,

    /// The sink rejected the payload or could not be reached in time.
    #[error("relay failed: {0}")]
    RelayFailure(String),
}
