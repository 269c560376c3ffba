//! Tracking payload assembly.
//!
//! [`assemble`] is pure: every input, including the clock, is passed in.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::arrival::ArrivalStatus;
use crate::error::TrackingError;
use crate::estimator::{PositionEstimate, PositionSource};
use crate::ranker::RankedStation;
use crate::reading::SensorReading;

/// Site-local reporting offset (UTC+7).
pub const REPORTING_OFFSET_SECS: i32 = 7 * 3600;

/// Station name emitted when no prediction is possible.
pub const UNAVAILABLE_STATION_NAME: &str = "Unknown";

/// Wire sentinel for an unavailable [`Metric`].
pub const UNAVAILABLE: &str = "N/A";

/// A number that may be unavailable. Serialized as the number itself or
/// as `"N/A"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Unavailable,
    Value(i64),
}

impl Metric {
    /// Rounds to the nearest integer; non-finite input is unavailable.
    pub fn rounded(value: f64) -> Self {
        if value.is_finite() {
            Self::Value(value.round() as i64)
        } else {
            Self::Unavailable
        }
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => serializer.serialize_i64(*v),
            Self::Unavailable => serializer.serialize_str(UNAVAILABLE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub speed: f64,
    pub heading: f64,
    pub source: PositionSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub station_id: Option<i64>,
    pub station_name: String,
    pub distance: Metric,
    pub eta_minutes: Metric,
}

impl Prediction {
    pub fn unavailable() -> Self {
        Self {
            station_id: None,
            station_name: UNAVAILABLE_STATION_NAME.to_string(),
            distance: Metric::Unavailable,
            eta_minutes: Metric::Unavailable,
        }
    }

    fn from_ranked(ranked: &RankedStation, station_name: String, eta_minutes: Metric) -> Self {
        Self {
            station_id: Some(ranked.station.id),
            station_name,
            distance: Metric::rounded(ranked.distance),
            eta_minutes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tracking {
    pub timestamp: String,
    pub position: Position,
    pub prediction: Prediction,
}

/// The canonical output of one ingestion cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingPayload {
    pub device_id: String,
    pub tracking: Tracking,
    pub raw_data: SensorReading,
}

/// Formats `now` at the reporting offset, e.g. `2026-10-19T17:00:00.000+07:00`.
pub fn local_timestamp(now: DateTime<Utc>) -> String {
    match FixedOffset::east_opt(REPORTING_OFFSET_SECS) {
        Some(offset) => now
            .with_timezone(&offset)
            .to_rfc3339_opts(SecondsFormat::Millis, false),
        None => now.to_rfc3339_opts(SecondsFormat::Millis, false),
    }
}

/// Merges one cycle's results into a [`TrackingPayload`].
pub fn assemble(
    estimate: &PositionEstimate,
    ranking: &[RankedStation],
    arrival: &ArrivalStatus,
    reading: &SensorReading,
    now: DateTime<Utc>,
) -> TrackingPayload {
    let prediction = predict(ranking, arrival).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "Prediction unavailable");
        Prediction::unavailable()
    });

    TrackingPayload {
        device_id: reading.device_id.clone(),
        tracking: Tracking {
            timestamp: local_timestamp(now),
            position: Position {
                speed: reading.vehicle_speed(),
                heading: reading.magnetometer_heading,
                source: estimate.source,
            },
            prediction,
        },
        raw_data: reading.clone(),
    }
}

fn predict(ranking: &[RankedStation], arrival: &ArrivalStatus) -> Result<Prediction, TrackingError> {
    let nearest = ranking.first().ok_or(TrackingError::EmptyStationCatalog)?;
    let find = |id: i64| ranking.iter().find(|r| r.station.id == id);

    if !arrival.is_arrived {
        return Ok(Prediction::from_ranked(
            nearest,
            nearest.station.name.clone(),
            Metric::rounded(nearest.eta_minutes),
        ));
    }

    let arrived_name = arrival
        .arrived_at
        .as_ref()
        .map_or(nearest.station.name.as_str(), |s| s.name.as_str());

    if let Some(next) = &arrival.next_station {
        let name = format!("ARRIVED at {arrived_name}, Next: {}", next.name);
        let prediction = match find(next.id).or_else(|| ranking.get(1)) {
            Some(target) => {
                Prediction::from_ranked(target, name, Metric::rounded(target.eta_minutes))
            }
            None => Prediction::from_ranked(nearest, name, Metric::Value(0)),
        };
        return Ok(prediction);
    }

    let arrived = arrival
        .arrived_at
        .as_ref()
        .and_then(|s| find(s.id))
        .unwrap_or(nearest);

    Ok(Prediction::from_ranked(
        arrived,
        format!("ARRIVED at {arrived_name} (Final Station)"),
        Metric::Value(0),
    ))
}
