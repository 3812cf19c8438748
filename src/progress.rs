//! Progress reporting with throttled notifications
//!
//! Transfers report after every received chunk. Each report updates the
//! store immediately, but an event is broadcast only when both the minimum
//! interval has elapsed and the value moved by at least the minimum delta.

use crate::config::ProgressConfig;
use crate::store::StateStore;
use crate::types::{DownloadState, Event, ItemId};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Rate limiter for progress notifications of one transfer
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    min_interval: Duration,
    min_delta: f64,
    last: Option<(Instant, f64)>,
}

impl ProgressThrottle {
    /// Create a throttle from configuration
    pub fn new(config: &ProgressConfig) -> Self {
        Self {
            min_interval: config.min_interval,
            min_delta: config.min_delta,
            last: None,
        }
    }

    /// Decide whether `progress` observed at `now` should be broadcast
    ///
    /// The first value is always emitted, and so is the first value that
    /// reaches completion; otherwise both thresholds must be met.
    pub fn should_emit(&mut self, progress: f64, now: Instant) -> bool {
        let emit = match self.last {
            None => true,
            Some((_, last_value)) if progress >= 1.0 && last_value < 1.0 => true,
            Some((at, last_value)) => {
                let change = (progress - last_value).abs();
                now.saturating_duration_since(at) >= self.min_interval
                    && change > 0.0
                    && change >= self.min_delta
            }
        };
        if emit {
            self.last = Some((now, progress));
        }
        emit
    }
}

/// Relays transfer progress into the store and the event channel
pub(crate) struct ProgressReporter {
    id: ItemId,
    store: Arc<StateStore>,
    event_tx: tokio::sync::broadcast::Sender<Event>,
    throttle: ProgressThrottle,
    floor: f64,
}

impl ProgressReporter {
    /// `floor` is the progress at which a resumed transfer starts; reports
    /// never go below it even if the source restarts from the first byte.
    pub(crate) fn new(
        id: ItemId,
        store: Arc<StateStore>,
        event_tx: tokio::sync::broadcast::Sender<Event>,
        config: &ProgressConfig,
        floor: f64,
    ) -> Self {
        Self {
            id,
            store,
            event_tx,
            throttle: ProgressThrottle::new(config),
            floor: floor.clamp(0.0, 1.0),
        }
    }

    /// Record `received` of `total` bytes
    pub(crate) async fn report(&mut self, received: u64, total: Option<u64>) {
        let progress = fraction(received, total).max(self.floor);
        let Some(stored) = self.store.update_progress(&self.id, progress).await else {
            return;
        };

        if self.throttle.should_emit(stored, Instant::now()) {
            self.event_tx
                .send(Event::StateChanged {
                    id: self.id.clone(),
                    state: DownloadState::Downloading { progress: stored },
                })
                .ok();
        }
    }
}

/// Completed fraction, `0.0` when the total is unknown
fn fraction(received: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => (received as f64 / total as f64).clamp(0.0, 1.0),
        _ => 0.0,
    }
}
