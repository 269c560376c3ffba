//! One ingestion cycle: estimate → rank → arrival → payload.
//!
//! [`Tracker`] owns all order-dependent state (last fix, arrival status). It
//! has a single owner, the ingestion task, so frames are processed strictly
//! one after another.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::arrival::{ArrivalConfig, ArrivalStatus};
use crate::estimator::{EstimatorConfig, Fix, estimate_position};
use crate::payload::{TrackingPayload, assemble};
use crate::ranker::{Station, rank_stations};
use crate::reading::SensorReading;

#[derive(Debug, Clone, Default)]
pub struct TrackerConfig {
    pub estimator: EstimatorConfig,
    pub arrival: ArrivalConfig,
}

#[derive(Debug, Default)]
pub struct Tracker {
    config: TrackerConfig,
    last_fix: Option<Fix>,
    arrival: ArrivalStatus,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            last_fix: None,
            arrival: ArrivalStatus::default(),
        }
    }

    pub fn last_fix(&self) -> Option<&Fix> {
        self.last_fix.as_ref()
    }

    pub fn arrival(&self) -> &ArrivalStatus {
        &self.arrival
    }

    /// Runs the whole pipeline for one reading against the current station
    /// snapshot. Always produces a payload.
    pub fn process(
        &mut self,
        reading: &SensorReading,
        stations: &[Station],
        now: DateTime<Utc>,
    ) -> TrackingPayload {
        let estimate = estimate_position(&self.config.estimator, reading, &mut self.last_fix, now);
        let speed = reading.vehicle_speed();

        let ranking = estimate
            .coordinates
            .map(|position| rank_stations(position, speed, stations))
            .unwrap_or_default();

        let is_arrived = self
            .arrival
            .update(&self.config.arrival, speed, &ranking, now);

        debug!(
            device_id = %reading.device_id,
            source = ?estimate.source,
            ranked = ranking.len(),
            is_arrived,
            "Cycle complete"
        );

        assemble(&estimate, &ranking, &self.arrival, reading, now)
    }
}
