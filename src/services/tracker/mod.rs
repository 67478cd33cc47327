//! Presence reconciliation for OwnTracks devices
//!
//! The Tracker turns decoded location and transition messages into presence
//! updates. It coordinates:
//! - Region precedence (an active region overrides raw GPS)
//! - Zone snapping (coordinates and accuracy taken from the zone)
//! - Mobile beacons (updates replicated to every beacon riding along)
//!
//! One mutex guards the whole ledger. Each message is decoded, reconciled,
//! applied and emitted while holding it, so two messages can never interleave
//! their reads and writes of a device's region or beacon lists.

mod handlers;

use crate::domain::types::DeviceKey;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::decoder::{decode_payload, Decoded, Route};
use crate::services::ledger::RegionLedger;
use crate::services::sink::PresenceSink;
use crate::services::zones::ZoneRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Central message processor for presence tracking
pub struct Tracker {
    /// Regions entered and beacons active, per device
    pub(crate) ledger: Mutex<RegionLedger>,
    /// Name → zone lookup
    pub(crate) zones: Arc<dyn ZoneRegistry>,
    /// Receives every presence update
    pub(crate) sink: Arc<dyn PresenceSink>,
    /// Metrics collector
    pub(crate) metrics: Arc<Metrics>,
    /// Fixes with a worse accuracy are dropped
    pub(crate) max_gps_accuracy: Option<f64>,
}

impl Tracker {
    pub fn new(
        config: &Config,
        zones: Arc<dyn ZoneRegistry>,
        sink: Arc<dyn PresenceSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            ledger: Mutex::new(RegionLedger::new()),
            zones,
            sink,
            metrics,
            max_gps_accuracy: config.max_gps_accuracy(),
        }
    }

    /// Process one MQTT publish. Failures are logged and the message dropped.
    pub fn handle_message(&self, route: Route, topic: &str, payload: &[u8]) {
        let process_start = Instant::now();
        let mut ledger = self.ledger.lock();

        match decode_payload(route, topic, payload) {
            Ok(Decoded::Location(event)) => self.handle_location(&mut ledger, event),
            Ok(Decoded::Transition(event)) => self.handle_transition(&mut ledger, event),
            Ok(Decoded::NotApplicable) => {
                self.metrics.record_message_ignored();
                debug!(topic = %topic, "message_not_applicable");
            }
            Err(e) if e.is_protocol() => {
                self.metrics.record_protocol_error();
                error!(topic = %topic, error = %e, "transition_protocol_error");
            }
            Err(e) => {
                self.metrics.record_decode_error();
                warn!(
                    topic = %topic,
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "payload_decode_failed"
                );
            }
        }

        drop(ledger);
        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_message_processed(latency_us);
    }

    /// Regions the device is currently inside, oldest first
    pub fn current_regions(&self, device: &DeviceKey) -> Vec<String> {
        self.ledger.lock().current_regions(device).to_vec()
    }

    /// Mobile beacons currently riding along with the device
    pub fn active_beacons(&self, device: &DeviceKey) -> Vec<String> {
        self.ledger.lock().active_beacons(device).to_vec()
    }

    /// Devices with region or beacon state
    pub fn tracked_devices(&self) -> usize {
        self.ledger.lock().tracked_devices()
    }

    /// Clear all region and beacon state
    pub fn reset(&self) {
        self.ledger.lock().clear();
    }

    /// True if `accuracy` is reported and worse than the configured maximum
    pub(crate) fn exceeds_max_accuracy(&self, accuracy: Option<f64>) -> bool {
        matches!((accuracy, self.max_gps_accuracy), (Some(acc), Some(max)) if acc > max)
    }
}
