//! Raw-reading audit archive.
//!
//! Every accepted frame is appended, with its original text, to a per-device
//! daily CSV file:
//!
//! ```text
//! <dir>/device_id=<id>/date=<YYYY-MM-DD>.csv
//! ```
//!
//! Writes go through an [`ArchiveQueue`]: one bounded channel drained by a
//! single blocking writer, so rows land in frame order and a slow disk never
//! stalls ingestion.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::reading::SensorReading;

/// Accepts readings for audit. Callers treat failures as non-fatal.
pub trait ReadingArchive: Send + Sync {
    fn store(&self, reading: &SensorReading, raw_message: &str, now: DateTime<Utc>) -> Result<()>;
}

/// One CSV row. `csv` cannot serialize flattened structs, so the reading
/// fields are spelled out.
#[derive(Debug, Serialize)]
struct ArchiveRecord<'a> {
    log_time: DateTime<Utc>,
    device_id: &'a str,
    gps_lat: f64,
    gps_lon: f64,
    gps_alt: f64,
    gps_speed: f64,
    accelero_speed: f64,
    accelero_ax: f64,
    accelero_ay: f64,
    accelero_az: f64,
    accelero_gx: f64,
    accelero_gy: f64,
    accelero_gz: f64,
    magnetometer_heading: f64,
    raw_message: &'a str,
}

impl<'a> ArchiveRecord<'a> {
    fn new(reading: &'a SensorReading, raw_message: &'a str, log_time: DateTime<Utc>) -> Self {
        Self {
            log_time,
            device_id: &reading.device_id,
            gps_lat: reading.gps_lat,
            gps_lon: reading.gps_lon,
            gps_alt: reading.gps_alt,
            gps_speed: reading.gps_speed,
            accelero_speed: reading.accelero_speed,
            accelero_ax: reading.accelero_ax,
            accelero_ay: reading.accelero_ay,
            accelero_az: reading.accelero_az,
            accelero_gx: reading.accelero_gx,
            accelero_gy: reading.accelero_gy,
            accelero_gz: reading.accelero_gz,
            magnetometer_heading: reading.magnetometer_heading,
            raw_message,
        }
    }
}

pub struct CsvReadingArchive {
    dir: PathBuf,
}

impl CsvReadingArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File a reading from `device_id` on `date` is appended to.
    pub fn path_for(&self, device_id: &str, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("device_id={}", sanitize(device_id)))
            .join(format!("date={}.csv", date.format("%Y-%m-%d")))
    }
}

impl ReadingArchive for CsvReadingArchive {
    fn store(&self, reading: &SensorReading, raw_message: &str, now: DateTime<Utc>) -> Result<()> {
        let path = self.path_for(&reading.device_id, now.date_naive());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let file_exists = path.exists();
        debug!(path = %path.display(), file_exists, "Appending raw reading");

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;

        let mut writer = WriterBuilder::new()
            .has_headers(!file_exists)
            .from_writer(file);

        writer.serialize(ArchiveRecord::new(reading, raw_message, now))?;
        writer.flush()?;

        Ok(())
    }
}

/// One accepted frame waiting to be archived.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub reading: SensorReading,
    pub raw_message: String,
    pub received_at: DateTime<Utc>,
}

/// Sending half of the archive writer.
#[derive(Debug, Clone)]
pub struct ArchiveQueue {
    tx: mpsc::Sender<ArchiveEntry>,
}

impl ArchiveQueue {
    /// Starts the writer on the blocking pool. It stores entries one at a
    /// time in the order they were pushed and exits once every queue handle
    /// is dropped.
    pub fn spawn(archive: Arc<dyn ReadingArchive>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ArchiveEntry>(capacity);

        let writer = tokio::task::spawn_blocking(move || {
            while let Some(entry) = rx.blocking_recv() {
                if let Err(e) = archive.store(&entry.reading, &entry.raw_message, entry.received_at) {
                    warn!(error = format!("{e:#}"), "Failed to archive raw reading");
                }
            }
            debug!("Archive writer stopped");
        });

        (Self { tx }, writer)
    }

    /// Queues `entry` without waiting. Returns `false` if it was dropped
    /// because the writer is behind or gone.
    pub fn push(&self, entry: ArchiveEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(TrySendError::Full(entry)) => {
                warn!(device_id = %entry.reading.device_id, "Archive queue full, dropping reading");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Archive writer has stopped, dropping reading");
                false
            }
        }
    }
}

/// Device ids come off the wire; keep them from escaping the archive dir.
fn sanitize(device_id: &str) -> String {
    device_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir); // clean up any prior run
        dir
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap()
    }

    fn reading() -> SensorReading {
        SensorReading {
            device_id: "10193712".to_string(),
            gps_lat: -6.241128,
            gps_lon: 106.844184,
            ..Default::default()
        }
    }

    #[test]
    fn test_store_creates_partitioned_file() {
        let dir = temp_dir("station_tracker_archive_create");
        let archive = CsvReadingArchive::new(&dir);

        archive.store(&reading(), "id:10193712,|gps:-6.241128,106.844184,0", t0()).unwrap();

        let path = dir.join("device_id=10193712").join("date=2025-10-09.csv");
        assert!(path.exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("raw_message"));
        assert!(content.contains("-6.241128"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_header_written_once() {
        let dir = temp_dir("station_tracker_archive_header");
        let archive = CsvReadingArchive::new(&dir);

        archive.store(&reading(), "a", t0()).unwrap();
        archive.store(&reading(), "b", t0()).unwrap();

        let content = fs::read_to_string(archive.path_for("10193712", t0().date_naive())).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines.iter().filter(|l| l.starts_with("log_time")).count(), 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_raw_message_with_delimiters_is_quoted() {
        let dir = temp_dir("station_tracker_archive_quote");
        let archive = CsvReadingArchive::new(&dir);
        let raw = "id:1,|gps:1,2,3,|magnetometer:90";

        archive.store(&reading(), raw, t0()).unwrap();

        let mut rdr = csv::Reader::from_path(archive.path_for("10193712", t0().date_naive())).unwrap();
        let headers = rdr.headers().unwrap().clone();
        let column = headers.iter().position(|h| h == "raw_message").unwrap();
        let record = rdr.records().next().unwrap().unwrap();
        assert_eq!(&record[column], raw);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_queue_writes_rows_in_push_order() {
        let dir = temp_dir("station_tracker_archive_queue");
        let archive = Arc::new(CsvReadingArchive::new(&dir));
        let (queue, writer) = ArchiveQueue::spawn(archive.clone(), 64);

        for i in 0..50 {
            assert!(queue.push(ArchiveEntry {
                reading: reading(),
                raw_message: format!("frame-{i}"),
                received_at: t0(),
            }));
        }
        drop(queue);
        writer.await.unwrap();

        let mut rdr = csv::Reader::from_path(archive.path_for("10193712", t0().date_naive())).unwrap();
        let headers = rdr.headers().unwrap().clone();
        let column = headers.iter().position(|h| h == "raw_message").unwrap();
        let raw: Vec<String> = rdr.records().map(|r| r.unwrap()[column].to_string()).collect();
        let expected: Vec<String> = (0..50).map(|i| format!("frame-{i}")).collect();
        assert_eq!(raw, expected);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        struct Stalled(std::sync::Mutex<()>);

        impl ReadingArchive for Stalled {
            fn store(&self, _: &SensorReading, _: &str, _: DateTime<Utc>) -> Result<()> {
                let _guard = self.0.lock().unwrap();
                Ok(())
            }
        }

        let stalled = Arc::new(Stalled(std::sync::Mutex::new(())));
        let guard = stalled.0.lock().unwrap();
        let (queue, writer) = ArchiveQueue::spawn(stalled.clone(), 1);
        let entry = || ArchiveEntry {
            reading: reading(),
            raw_message: String::new(),
            received_at: t0(),
        };

        // The writer holds at most one entry in hand and one in the channel.
        let accepted = (0..5).filter(|_| queue.push(entry())).count();
        assert!(accepted <= 2);

        drop(guard);
        drop(queue);
        writer.await.unwrap();
    }

    #[test]
    fn test_device_id_cannot_escape_dir() {
        let archive = CsvReadingArchive::new("/tmp/archive");
        let path = archive.path_for("../../etc", t0().date_naive());
        assert!(path.starts_with("/tmp/archive/device_id=______etc"));
    }
}
