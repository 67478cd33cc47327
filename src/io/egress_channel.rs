//! Typed channel for presence egress
//!
//! Provides a non-blocking `PresenceSink` backed by a bounded mpsc channel, so
//! the tracker never waits on the MQTT publisher while holding its lock.

use crate::domain::types::PresenceUpdate;
use crate::infra::metrics::Metrics;
use crate::services::sink::PresenceSink;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Sender half handed to the tracker as its sink
pub struct EgressSender {
    tx: mpsc::Sender<PresenceUpdate>,
    metrics: Arc<Metrics>,
    /// Rate-limits drop warnings to 1 per second
    last_drop_warn: Mutex<Instant>,
}

/// Create a bounded egress channel
pub fn create_egress_channel(
    capacity: usize,
    metrics: Arc<Metrics>,
) -> (EgressSender, mpsc::Receiver<PresenceUpdate>) {
    let (tx, rx) = mpsc::channel(capacity);
    let sender = EgressSender {
        tx,
        metrics,
        last_drop_warn: Mutex::new(Instant::now() - Duration::from_secs(2)),
    };
    (sender, rx)
}

impl PresenceSink for EgressSender {
    fn see(&self, update: &PresenceUpdate) {
        match self.tx.try_send(update.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                self.metrics.record_egress_dropped();
                let mut last = self.last_drop_warn.lock();
                if last.elapsed() > Duration::from_secs(1) {
                    warn!(dev_id = %dropped.dev_id, "egress_update_dropped: channel full");
                    *last = Instant::now();
                }
            }
            Err(TrySendError::Closed(dropped)) => {
                self.metrics.record_egress_dropped();
                warn!(dev_id = %dropped.dev_id, "egress_channel_closed");
            }
        }
    }
}
