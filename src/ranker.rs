//! Station model and proximity ranking.

use serde::{Deserialize, Serialize};

use crate::geo::{Coordinates, haversine_distance};

/// A stopping point from the station catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Station {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// A station annotated for one estimation cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedStation {
    pub station: Station,
    /// Meters.
    pub distance: f64,
    /// Minutes; `f64::INFINITY` when the vehicle is not moving.
    pub eta_minutes: f64,
}

/// Minutes to cover `distance_m` at `speed_kmh`.
pub fn eta_minutes(distance_m: f64, speed_kmh: f64) -> f64 {
    if speed_kmh <= 0.0 {
        return f64::INFINITY;
    }
    distance_m / (speed_kmh / 3.6) / 60.0
}

/// Ranks every active station by distance from `position`, nearest first.
///
/// Equal distances keep catalog order. An empty catalog yields an empty
/// ranking.
pub fn rank_stations(position: Coordinates, speed_kmh: f64, stations: &[Station]) -> Vec<RankedStation> {
    let mut ranked: Vec<RankedStation> = stations
        .iter()
        .filter(|s| s.active)
        .map(|station| {
            let distance = haversine_distance(position, station.coordinates());
            RankedStation {
                station: station.clone(),
                distance,
                eta_minutes: eta_minutes(distance, speed_kmh),
            }
        })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: i64, name: &str, latitude: f64, longitude: f64) -> Station {
        Station {
            id,
            name: name.to_string(),
            latitude,
            longitude,
            active: true,
        }
    }

    fn catalog() -> Vec<Station> {
        vec![
            station(1, "Far", -6.30, 106.80),
            station(2, "Near", -6.2005, 106.80),
            station(3, "Middle", -6.25, 106.80),
        ]
    }

    #[test]
    fn test_sorted_ascending() {
        let ranked = rank_stations(Coordinates::new(-6.2, 106.8), 30.0, &catalog());

        let names: Vec<_> = ranked.iter().map(|r| r.station.name.as_str()).collect();
        assert_eq!(names, ["Near", "Middle", "Far"]);
        assert!(ranked.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_length_matches_active_stations() {
        let mut stations = catalog();
        assert_eq!(rank_stations(Coordinates::new(0.0, 1.0), 0.0, &stations).len(), 3);

        stations[0].active = false;
        let ranked = rank_stations(Coordinates::new(0.0, 1.0), 0.0, &stations);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|r| r.station.id != 1));
    }

    #[test]
    fn test_ties_keep_catalog_order() {
        let stations = vec![
            station(10, "First", -6.21, 106.80),
            station(11, "Second", -6.21, 106.80),
            station(12, "Third", -6.21, 106.80),
        ];

        let ranked = rank_stations(Coordinates::new(-6.2, 106.8), 10.0, &stations);

        let ids: Vec<_> = ranked.iter().map(|r| r.station.id).collect();
        assert_eq!(ids, [10, 11, 12]);
    }

    #[test]
    fn test_empty_catalog_is_empty_ranking() {
        assert!(rank_stations(Coordinates::new(-6.2, 106.8), 10.0, &[]).is_empty());
    }

    #[test]
    fn test_eta_in_minutes() {
        // 1 km at 60 km/h
        assert!((eta_minutes(1000.0, 60.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_eta_infinite_when_stopped() {
        assert_eq!(eta_minutes(500.0, 0.0), f64::INFINITY);
        assert_eq!(eta_minutes(500.0, -3.0), f64::INFINITY);

        let ranked = rank_stations(Coordinates::new(-6.2, 106.8), 0.0, &catalog());
        assert!(ranked.iter().all(|r| r.eta_minutes.is_infinite()));
    }

    #[test]
    fn test_station_json_defaults_active() {
        let station: Station =
            serde_json::from_str(r#"{"id":4,"name":"Manggarai","latitude":-6.21,"longitude":106.85}"#)
                .unwrap();
        assert!(station.active);
    }
}
