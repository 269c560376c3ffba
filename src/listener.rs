//! UDP frame listener.
//!
//! Each datagram is one frame. The listener owns one [`Tracker`] per device
//! id, so frames run through the pipeline one at a time in arrival order and
//! one device's fix never feeds another's estimate. Every result is published
//! to the shared [`LatestTracking`] slot.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveEntry, ArchiveQueue};
use crate::catalog::StationSnapshot;
use crate::parser::parse_frame;
use crate::store::LatestTracking;
use crate::tracker::{Tracker, TrackerConfig};

/// Largest frame accepted; anything longer is dropped as truncated.
pub const MAX_FRAME_SIZE: usize = 2048;

pub struct FrameListener {
    config: TrackerConfig,
    trackers: HashMap<String, Tracker>,
    stations: Arc<StationSnapshot>,
    store: Arc<LatestTracking>,
    archive: Option<ArchiveQueue>,
}

impl FrameListener {
    pub fn new(config: TrackerConfig, stations: Arc<StationSnapshot>, store: Arc<LatestTracking>) -> Self {
        Self {
            config,
            trackers: HashMap::new(),
            stations,
            store,
            archive: None,
        }
    }

    /// Also queue every accepted frame on `archive`.
    pub fn with_archive(mut self, archive: ArchiveQueue) -> Self {
        self.archive = Some(archive);
        self
    }

    /// State for `device_id`, if it has sent an accepted frame.
    pub fn tracker(&self, device_id: &str) -> Option<&Tracker> {
        self.trackers.get(device_id)
    }

    /// Runs one frame through the pipeline. Returns the published generation,
    /// or `None` if the frame was rejected.
    pub fn handle_frame(&mut self, raw: &str, now: DateTime<Utc>) -> Option<u64> {
        let reading = match parse_frame(raw) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(error = %e, "Dropping frame");
                self.store.record_frame(now, false);
                return None;
            }
        };
        self.store.record_frame(now, true);

        if let Some(archive) = &self.archive {
            archive.push(ArchiveEntry {
                reading: reading.clone(),
                raw_message: raw.to_string(),
                received_at: now,
            });
        }

        if !self.trackers.contains_key(&reading.device_id) {
            info!(device_id = %reading.device_id, "New device seen");
        }
        let config = &self.config;
        let tracker = self
            .trackers
            .entry(reading.device_id.clone())
            .or_insert_with(|| Tracker::new(config.clone()));

        let stations = self.stations.get();
        let payload = tracker.process(&reading, &stations, now);
        let generation = self.store.publish(payload, now);

        debug!(generation, device_id = %reading.device_id, "Tracking updated");
        Some(generation)
    }

    /// Binds `addr` and processes frames until the socket fails.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("binding UDP socket on {addr}"))?;
        self.serve(socket).await
    }

    /// Processes frames from an already-bound socket.
    pub async fn serve(mut self, socket: UdpSocket) -> Result<()> {
        info!(local_addr = ?socket.local_addr().ok(), "Frame listener started");

        // One spare byte tells an oversized datagram from one that fits exactly.
        let mut buffer = [0u8; MAX_FRAME_SIZE + 1];
        let mut frames: u64 = 0;

        loop {
            let (len, peer) = socket
                .recv_from(&mut buffer)
                .await
                .context("receiving UDP frame")?;
            frames += 1;

            if frames == 1 {
                info!(%peer, "Received first frame");
            }

            if len > MAX_FRAME_SIZE {
                warn!(%peer, max = MAX_FRAME_SIZE, "Dropping oversized frame");
                self.store.record_frame(Utc::now(), false);
                continue;
            }

            let raw = String::from_utf8_lossy(&buffer[..len]);
            debug!(%peer, frame = %raw.trim(), "Frame received");

            self.handle_frame(raw.trim(), Utc::now());
        }
    }
}
