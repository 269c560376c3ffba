//! Timer-driven relay of the latest tracking payload to an external sink.
//!
//! Delivery is best-effort: a failed tick is logged and forgotten, and the
//! next tick sends whatever is latest at that moment.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::TrackingError;
use crate::fetch::{HttpClient, post_json};
use crate::store::LatestTracking;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub sink_url: String,
    pub interval: Duration,
}

impl RelayConfig {
    pub fn new(sink_url: impl Into<String>) -> Self {
        Self {
            sink_url: sink_url.into(),
            interval: Duration::from_secs(1),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Nothing has been published yet.
    Empty,
    /// The latest generation was already delivered.
    Unchanged(u64),
    Delivered(u64),
}

pub struct RelayWorker {
    client: Box<dyn HttpClient>,
    config: RelayConfig,
    store: Arc<LatestTracking>,
    last_delivered: Option<u64>,
}

impl RelayWorker {
    pub fn new(client: Box<dyn HttpClient>, config: RelayConfig, store: Arc<LatestTracking>) -> Self {
        Self {
            client,
            config,
            store,
            last_delivered: None,
        }
    }

    /// Reads the slot once and pushes it to the sink if it holds an
    /// undelivered generation.
    pub async fn tick(&mut self) -> Result<RelayOutcome, TrackingError> {
        let Some(snapshot) = self.store.latest() else {
            return Ok(RelayOutcome::Empty);
        };

        if self.last_delivered == Some(snapshot.generation) {
            return Ok(RelayOutcome::Unchanged(snapshot.generation));
        }

        post_json(self.client.as_ref(), &self.config.sink_url, &snapshot.payload)
            .await
            .map_err(|e| TrackingError::RelayFailure(format!("{e:#}")))?;

        self.last_delivered = Some(snapshot.generation);
        Ok(RelayOutcome::Delivered(snapshot.generation))
    }

    /// Ticks forever on the configured interval. Failures never stop the loop.
    #[tracing::instrument(skip(self), fields(sink = %self.config.sink_url))]
    pub async fn run(mut self) {
        info!(interval_ms = self.config.interval.as_millis() as u64, "Relay worker started");

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            match self.tick().await {
                Ok(RelayOutcome::Delivered(generation)) => {
                    debug!(generation, "Payload relayed");
                }
                Ok(RelayOutcome::Unchanged(generation)) => {
                    debug!(generation, "Latest payload already relayed");
                }
                Ok(RelayOutcome::Empty) => {
                    debug!("No tracking data to relay yet");
                }
                Err(e) => {
                    error!(error = %e, "Relay tick failed");
                }
            }
        }
    }
}
