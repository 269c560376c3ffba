//! Station catalog access and the shared, periodically refreshed snapshot.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::ranker::Station;

/// Read-only source of stations.
#[async_trait]
pub trait StationCatalog: Send + Sync {
    /// Returns the active stations in catalog order.
    async fn active_stations(&self) -> Result<Vec<Station>>;
}

/// Decodes a JSON array of stations and keeps the active ones.
pub fn parse_stations(bytes: &[u8]) -> Result<Vec<Station>> {
    let stations: Vec<Station> = serde_json::from_slice(bytes).context("decoding station list")?;
    Ok(stations.into_iter().filter(|s| s.active).collect())
}

/// Stations stored as a JSON array on disk:
///
/// ```json
/// [
///   { "id": 1, "name": "Manggarai", "latitude": -6.2099, "longitude": 106.8502 },
///   { "id": 2, "name": "Cikini", "latitude": -6.1987, "longitude": 106.8414, "active": false }
/// ]
/// ```
pub struct FileStationCatalog {
    path: PathBuf,
}

impl FileStationCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StationCatalog for FileStationCatalog {
    async fn active_stations(&self) -> Result<Vec<Station>> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        parse_stations(&bytes)
    }
}

/// The station list the pipeline ranks against. Replaced wholesale on
/// refresh; readers hold their own `Arc` for the length of a cycle.
#[derive(Debug, Default)]
pub struct StationSnapshot {
    stations: RwLock<Arc<Vec<Station>>>,
}

impl StationSnapshot {
    pub fn new(stations: Vec<Station>) -> Self {
        Self {
            stations: RwLock::new(Arc::new(stations)),
        }
    }

    pub fn get(&self) -> Arc<Vec<Station>> {
        Arc::clone(&self.stations.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn replace(&self, stations: Vec<Station>) {
        *self.stations.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(stations);
    }
}

/// Loads the catalog once into `snapshot`. On failure the previous snapshot
/// is kept.
pub async fn refresh_once(catalog: &dyn StationCatalog, snapshot: &StationSnapshot) -> Result<usize> {
    let stations = catalog.active_stations().await?;
    let count = stations.len();
    if count == 0 {
        warn!("Station catalog returned no active stations");
    }
    snapshot.replace(stations);
    Ok(count)
}

/// Refreshes `snapshot` from `catalog` every `every`, forever. The first
/// refresh happens one period from now; load the initial snapshot with
/// [`refresh_once`].
#[tracing::instrument(skip_all, fields(every_secs = every.as_secs()))]
pub async fn refresh_loop(
    catalog: Arc<dyn StationCatalog>,
    snapshot: Arc<StationSnapshot>,
    every: Duration,
) {
    let start = tokio::time::Instant::now() + every;
    let mut interval = tokio::time::interval_at(start, every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        match refresh_once(catalog.as_ref(), &snapshot).await {
            Ok(count) => info!(count, "Station snapshot refreshed"),
            Err(e) => error!(error = format!("{e:#}"), "Station refresh failed, keeping previous snapshot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    struct Failing;

    #[async_trait]
    impl StationCatalog for Failing {
        async fn active_stations(&self) -> Result<Vec<Station>> {
            anyhow::bail!("catalog offline")
        }
    }

    const STATIONS_JSON: &str = r#"[
        {"id": 1, "name": "Manggarai", "latitude": -6.2099, "longitude": 106.8502},
        {"id": 2, "name": "Cikini", "latitude": -6.1987, "longitude": 106.8414, "active": false},
        {"id": 3, "name": "Gondangdia", "latitude": -6.1861, "longitude": 106.8325, "active": true}
    ]"#;

    #[test]
    fn test_parse_keeps_active_in_order() {
        let stations = parse_stations(STATIONS_JSON.as_bytes()).unwrap();

        let ids: Vec<_> = stations.iter().map(|s| s.id).collect();
        assert_eq!(ids, [1, 3]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_stations(b"{not json").is_err());
    }

    #[tokio::test]
    async fn test_file_catalog() {
        let path = env::temp_dir().join("station_tracker_catalog_test.json");
        fs::write(&path, STATIONS_JSON).unwrap();

        let stations = FileStationCatalog::new(&path).active_stations().await.unwrap();
        assert_eq!(stations.len(), 2);

        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let catalog = FileStationCatalog::new("/nonexistent/stations.json");
        assert!(catalog.active_stations().await.is_err());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let snapshot = StationSnapshot::new(parse_stations(STATIONS_JSON.as_bytes()).unwrap());

        assert!(refresh_once(&Failing, &snapshot).await.is_err());
        assert_eq!(snapshot.get().len(), 2);
    }

    #[test]
    fn test_replace_does_not_affect_held_snapshot() {
        let snapshot = StationSnapshot::new(parse_stations(STATIONS_JSON.as_bytes()).unwrap());
        let held = snapshot.get();

        snapshot.replace(Vec::new());

        assert_eq!(held.len(), 2);
        assert!(snapshot.get().is_empty());
    }
}
