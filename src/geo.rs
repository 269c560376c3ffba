//! Spherical-earth helpers.
//!
//! - Latitude/longitude: degrees
//! - Heading: degrees clockwise from north
//! - Distance: meters

use std::f64::consts::PI;

use serde::Serialize;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude, used for short-range displacement.
pub const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

const DEG_TO_RAD: f64 = PI / 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Great-circle distance between two points (haversine).
pub fn haversine_distance(from: Coordinates, to: Coordinates) -> f64 {
    let lat1 = from.latitude * DEG_TO_RAD;
    let lat2 = to.latitude * DEG_TO_RAD;
    let d_lat = (to.latitude - from.latitude) * DEG_TO_RAD;
    let d_lon = (to.longitude - from.longitude) * DEG_TO_RAD;

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Moves `start` by `distance_m` along `heading_deg` on a local flat-earth
/// approximation. Only valid for short displacements.
pub fn displace(start: Coordinates, heading_deg: f64, distance_m: f64) -> Coordinates {
    let heading = heading_deg * DEG_TO_RAD;
    let east = distance_m * heading.sin();
    let north = distance_m * heading.cos();

    let lat_per_meter = 1.0 / METERS_PER_DEGREE_LAT;
    let lon_per_meter = 1.0 / (METERS_PER_DEGREE_LAT * (start.latitude * DEG_TO_RAD).cos());

    Coordinates {
        latitude: start.latitude + north * lat_per_meter,
        longitude: start.longitude + east * lon_per_meter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = Coordinates::new(-6.2, 106.8);
        assert_eq!(haversine_distance(p, p), 0.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = haversine_distance(Coordinates::new(0.0, 0.0), Coordinates::new(1.0, 0.0));
        // 2πR / 360
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = Coordinates::new(-6.175, 106.827);
        let b = Coordinates::new(-6.200, 106.845);
        assert!((haversine_distance(a, b) - haversine_distance(b, a)).abs() < 1e-9);
    }

    #[test]
    fn test_displace_north() {
        let moved = displace(Coordinates::new(0.0, 0.0), 0.0, METERS_PER_DEGREE_LAT);
        assert!((moved.latitude - 1.0).abs() < 1e-9);
        assert!(moved.longitude.abs() < 1e-9);
    }

    #[test]
    fn test_displace_east_scales_with_latitude() {
        let moved = displace(Coordinates::new(60.0, 10.0), 90.0, METERS_PER_DEGREE_LAT);
        assert!((moved.latitude - 60.0).abs() < 1e-9);
        // cos(60°) = 0.5, so the same distance covers two degrees of longitude
        assert!((moved.longitude - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_displace_zero_distance() {
        let start = Coordinates::new(-6.2, 106.8);
        for heading in [0.0, 45.0, 90.0, 211.0, 359.9] {
            assert_eq!(displace(start, heading, 0.0), start);
        }
    }
}
