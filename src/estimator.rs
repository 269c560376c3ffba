//! GPS-or-dead-reckoning position estimation.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::TrackingError;
use crate::geo::{Coordinates, displace};
use crate::reading::SensorReading;

/// Where a [`PositionEstimate`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSource {
    Gps,
    DeadReckoning,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionEstimate {
    /// `None` only when the source is [`PositionSource::Unknown`].
    pub coordinates: Option<Coordinates>,
    pub source: PositionSource,
}

impl PositionEstimate {
    pub fn unknown() -> Self {
        Self {
            coordinates: None,
            source: PositionSource::Unknown,
        }
    }
}

/// Last trusted GPS position and when it was received.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub position: Coordinates,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    /// Beyond this age the last fix is returned without extrapolation.
    pub max_fix_age: Duration,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            max_fix_age: Duration::seconds(30),
        }
    }
}

/// Produces a position for `reading`, re-anchoring `last_fix` whenever the
/// reading carries a real GPS fix.
pub fn estimate_position(
    config: &EstimatorConfig,
    reading: &SensorReading,
    last_fix: &mut Option<Fix>,
    now: DateTime<Utc>,
) -> PositionEstimate {
    if reading.has_gps_fix() {
        let position = Coordinates::new(reading.gps_lat, reading.gps_lon);
        *last_fix = Some(Fix { position, at: now });
        return PositionEstimate {
            coordinates: Some(position),
            source: PositionSource::Gps,
        };
    }

    match dead_reckon(config, reading, last_fix.as_ref(), now) {
        Ok(position) => PositionEstimate {
            coordinates: Some(position),
            source: PositionSource::DeadReckoning,
        },
        Err(e) => {
            debug!(error = %e, device_id = %reading.device_id, "Position unknown");
            PositionEstimate::unknown()
        }
    }
}

fn dead_reckon(
    config: &EstimatorConfig,
    reading: &SensorReading,
    last_fix: Option<&Fix>,
    now: DateTime<Utc>,
) -> Result<Coordinates, TrackingError> {
    let fix = last_fix.ok_or(TrackingError::NoFixAvailable)?;

    // Clock skew between frames must not run the estimate backwards.
    let elapsed = (now - fix.at).max(Duration::zero());
    if elapsed > config.max_fix_age {
        debug!(
            elapsed_secs = elapsed.num_seconds(),
            "Last fix is stale, holding position"
        );
        return Ok(fix.position);
    }

    let speed_ms = reading.accelero_speed / 3.6;
    let elapsed_secs = elapsed.num_milliseconds() as f64 / 1000.0;
    let distance = speed_ms * elapsed_secs;

    trace!(
        distance_m = distance,
        heading = reading.magnetometer_heading,
        "Dead-reckoning from last fix"
    );

    Ok(displace(fix.position, reading.magnetometer_heading, distance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{METERS_PER_DEGREE_LAT, haversine_distance};

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap()
    }

    fn gps(lat: f64, lon: f64) -> SensorReading {
        SensorReading {
            gps_lat: lat,
            gps_lon: lon,
            ..Default::default()
        }
    }

    fn inertial(speed_kmh: f64, heading: f64) -> SensorReading {
        SensorReading {
            accelero_speed: speed_kmh,
            magnetometer_heading: heading,
            ..Default::default()
        }
    }

    #[test]
    fn test_gps_fix_is_used_and_stored() {
        let config = EstimatorConfig::default();
        let mut last_fix = None;

        let estimate = estimate_position(&config, &gps(-6.2, 106.8), &mut last_fix, t0());

        assert_eq!(estimate.source, PositionSource::Gps);
        assert_eq!(estimate.coordinates, Some(Coordinates::new(-6.2, 106.8)));
        assert_eq!(
            last_fix,
            Some(Fix {
                position: Coordinates::new(-6.2, 106.8),
                at: t0()
            })
        );
    }

    #[test]
    fn test_same_fix_twice_is_idempotent() {
        let config = EstimatorConfig::default();
        let mut last_fix = None;

        let first = estimate_position(&config, &gps(-6.2, 106.8), &mut last_fix, t0());
        let second = estimate_position(&config, &gps(-6.2, 106.8), &mut last_fix, t0());

        assert_eq!(first, second);
        assert_eq!(last_fix.unwrap().position, Coordinates::new(-6.2, 106.8));
    }

    #[test]
    fn test_zero_zero_is_never_gps() {
        let config = EstimatorConfig::default();

        let mut cold = None;
        let estimate = estimate_position(&config, &gps(0.0, 0.0), &mut cold, t0());
        assert_ne!(estimate.source, PositionSource::Gps);

        let mut warm = Some(Fix {
            position: Coordinates::new(1.0, 1.0),
            at: t0(),
        });
        let estimate = estimate_position(&config, &gps(0.0, 0.0), &mut warm, t0());
        assert_ne!(estimate.source, PositionSource::Gps);
    }

    #[test]
    fn test_cold_start_is_unknown() {
        let config = EstimatorConfig::default();
        let mut last_fix = None;

        let estimate = estimate_position(&config, &inertial(10.0, 90.0), &mut last_fix, t0());

        assert_eq!(estimate, PositionEstimate::unknown());
        assert!(last_fix.is_none());
    }

    #[test]
    fn test_dead_reckoning_moves_along_heading() {
        let config = EstimatorConfig::default();
        let mut last_fix = Some(Fix {
            position: Coordinates::new(0.0, 0.0),
            at: t0(),
        });

        // 36 km/h for 10 s = 100 m due north
        let estimate = estimate_position(
            &config,
            &inertial(36.0, 0.0),
            &mut last_fix,
            t0() + Duration::seconds(10),
        );

        assert_eq!(estimate.source, PositionSource::DeadReckoning);
        let position = estimate.coordinates.unwrap();
        assert!((position.latitude - 100.0 / METERS_PER_DEGREE_LAT).abs() < 1e-9);
        assert!(position.longitude.abs() < 1e-9);
    }

    #[test]
    fn test_dead_reckoning_does_not_move_the_fix() {
        let config = EstimatorConfig::default();
        let fix = Fix {
            position: Coordinates::new(-6.2, 106.8),
            at: t0(),
        };
        let mut last_fix = Some(fix);

        estimate_position(
            &config,
            &inertial(50.0, 135.0),
            &mut last_fix,
            t0() + Duration::seconds(5),
        );

        assert_eq!(last_fix, Some(fix));
    }

    #[test]
    fn test_zero_speed_has_zero_displacement() {
        let config = EstimatorConfig::default();
        let origin = Coordinates::new(-6.2, 106.8);

        for heading in [0.0, 90.0, 180.0, 270.0, 33.3] {
            for secs in [0, 1, 15, 30] {
                let mut last_fix = Some(Fix {
                    position: origin,
                    at: t0(),
                });
                let estimate = estimate_position(
                    &config,
                    &inertial(0.0, heading),
                    &mut last_fix,
                    t0() + Duration::seconds(secs),
                );
                assert_eq!(estimate.coordinates, Some(origin));
            }
        }
    }

    #[test]
    fn test_stale_fix_is_held() {
        let config = EstimatorConfig::default();
        let origin = Coordinates::new(-6.2, 106.8);
        let mut last_fix = Some(Fix {
            position: origin,
            at: t0(),
        });

        let estimate = estimate_position(
            &config,
            &inertial(80.0, 45.0),
            &mut last_fix,
            t0() + Duration::seconds(31),
        );

        assert_eq!(estimate.source, PositionSource::DeadReckoning);
        assert_eq!(estimate.coordinates, Some(origin));
    }

    #[test]
    fn test_gps_reanchors_after_dead_reckoning() {
        let config = EstimatorConfig::default();
        let mut last_fix = Some(Fix {
            position: Coordinates::new(0.0, 0.0),
            at: t0(),
        });

        let drifted = estimate_position(
            &config,
            &inertial(36.0, 90.0),
            &mut last_fix,
            t0() + Duration::seconds(20),
        );
        let corrected = estimate_position(
            &config,
            &gps(0.001, 0.001),
            &mut last_fix,
            t0() + Duration::seconds(21),
        );

        assert!(haversine_distance(drifted.coordinates.unwrap(), Coordinates::new(0.0, 0.0)) > 150.0);
        assert_eq!(corrected.coordinates, Some(Coordinates::new(0.001, 0.001)));
        assert_eq!(last_fix.unwrap().at, t0() + Duration::seconds(21));
    }
}
