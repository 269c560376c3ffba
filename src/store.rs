//! Single-slot store for the latest tracking payload, plus link statistics.
//!
//! Writers swap in a whole new [`Snapshot`]; readers clone the `Arc` and so
//! never observe a half-updated payload.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::payload::TrackingPayload;

/// A link counts as connected if a frame arrived within this window.
pub const MAX_FRAME_AGE_SECS: i64 = 10;

/// One published payload and its position in the publish sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Starts at 1 and increases on every publish.
    pub generation: u64,
    pub published_at: DateTime<Utc>,
    pub payload: TrackingPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkStatus {
    pub connected: bool,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub frames_received: u64,
    pub frames_rejected: u64,
}

#[derive(Debug, Default)]
pub struct LatestTracking {
    slot: RwLock<Option<Arc<Snapshot>>>,
    generation: AtomicU64,
    last_frame_at: RwLock<Option<DateTime<Utc>>>,
    frames_received: AtomicU64,
    frames_rejected: AtomicU64,
}

impl LatestTracking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the latest payload and returns its generation.
    pub fn publish(&self, payload: TrackingPayload, now: DateTime<Utc>) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(Snapshot {
            generation,
            published_at: now,
            payload,
        });
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        generation
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records that a frame arrived, whether or not it parsed.
    pub fn record_frame(&self, now: DateTime<Utc>, accepted: bool) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        if !accepted {
            self.frames_rejected.fetch_add(1, Ordering::Relaxed);
        }
        *self
            .last_frame_at
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(now);
    }

    pub fn link_status(&self, now: DateTime<Utc>) -> LinkStatus {
        let last_frame_at = *self
            .last_frame_at
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let max_age = Duration::seconds(MAX_FRAME_AGE_SECS);

        LinkStatus {
            connected: last_frame_at.is_some_and(|at| now - at < max_age),
            last_frame_at,
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
        }
    }
}
