//! Arrival/departure detection with cooldown hysteresis.
//!
//! Low speed near a station flickers under GPS noise, so once the vehicle is
//! seen as arrived it stays arrived for the whole cooldown regardless of the
//! inputs. After the cooldown it departs as soon as the arrival condition
//! stops holding.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::ranker::RankedStation;

#[derive(Debug, Clone)]
pub struct ArrivalConfig {
    /// Speed must be strictly below this, km/h.
    pub max_speed_kmh: f64,
    /// Nearest station must be strictly closer than this, meters.
    pub max_distance_m: f64,
    pub cooldown: Duration,
}

impl Default for ArrivalConfig {
    fn default() -> Self {
        Self {
            max_speed_kmh: 2.0,
            max_distance_m: 100.0,
            cooldown: Duration::seconds(60),
        }
    }
}

/// Minimal handle on a station captured at arrival time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationRef {
    pub id: i64,
    pub name: String,
}

impl From<&RankedStation> for StationRef {
    fn from(ranked: &RankedStation) -> Self {
        Self {
            id: ranked.station.id,
            name: ranked.station.name.clone(),
        }
    }
}

/// Process-lifetime arrival state. [`ArrivalStatus::default`] is the
/// departed baseline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrivalStatus {
    pub is_arrived: bool,
    pub arrived_at: Option<StationRef>,
    pub next_station: Option<StationRef>,
    pub arrived_time: Option<DateTime<Utc>>,
}

impl ArrivalStatus {
    /// Advances the state machine by one cycle and returns whether the
    /// vehicle counts as arrived for this cycle.
    ///
    /// `ranking` must be sorted nearest first; an empty ranking never
    /// triggers an arrival.
    pub fn update(
        &mut self,
        config: &ArrivalConfig,
        speed_kmh: f64,
        ranking: &[RankedStation],
        now: DateTime<Utc>,
    ) -> bool {
        let nearest = ranking.first();
        let condition = nearest
            .is_some_and(|n| speed_kmh < config.max_speed_kmh && n.distance < config.max_distance_m);

        if !self.is_arrived {
            if let (true, Some(nearest)) = (condition, nearest) {
                self.arrive(nearest, ranking.get(1), speed_kmh, now);
            }
            return self.is_arrived;
        }

        if self.in_cooldown(config, now) {
            debug!(
                station = self.arrived_name(),
                remaining_secs = self.cooldown_remaining(config, now).num_seconds(),
                "Still in arrival cooldown"
            );
            return true;
        }

        if !condition {
            info!(station = self.arrived_name(), "Departure detected");
            *self = Self::default();
        }

        self.is_arrived
    }

    fn arrive(
        &mut self,
        nearest: &RankedStation,
        second: Option<&RankedStation>,
        speed_kmh: f64,
        now: DateTime<Utc>,
    ) {
        info!(
            station = %nearest.station.name,
            speed_kmh,
            distance_m = nearest.distance,
            "Arrival detected"
        );

        match second {
            Some(next) => debug!(
                next = %next.station.name,
                distance_m = next.distance,
                "Next station designated"
            ),
            None => debug!("No next station, treating as final destination"),
        }

        *self = Self {
            is_arrived: true,
            arrived_at: Some(nearest.into()),
            next_station: second.map(Into::into),
            arrived_time: Some(now),
        };
    }

    fn in_cooldown(&self, config: &ArrivalConfig, now: DateTime<Utc>) -> bool {
        self.arrived_time
            .is_some_and(|arrived| now - arrived <= config.cooldown)
    }

    fn cooldown_remaining(&self, config: &ArrivalConfig, now: DateTime<Utc>) -> Duration {
        self.arrived_time
            .map_or(Duration::zero(), |arrived| config.cooldown - (now - arrived))
    }

    fn arrived_name(&self) -> &str {
        self.arrived_at.as_ref().map_or("", |s| s.name.as_str())
    }
}
