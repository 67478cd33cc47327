//! Presence sink contract
//!
//! The tracker calls `see` while holding its ledger lock, so implementations
//! must return promptly and never wait on the network.

use crate::domain::types::PresenceUpdate;
use tracing::info;

/// Records a device's resolved position
pub trait PresenceSink: Send + Sync {
    fn see(&self, update: &PresenceUpdate);
}

/// Sink that only logs, used when MQTT egress is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl PresenceSink for LogSink {
    fn see(&self, update: &PresenceUpdate) {
        info!(
            dev_id = %update.dev_id,
            host_name = %update.host_name,
            location_name = ?update.location_name,
            lat = ?update.gps.map(|g| g.lat),
            lon = ?update.gps.map(|g| g.lon),
            gps_accuracy = ?update.gps_accuracy,
            battery = ?update.battery,
            "presence_update"
        );
    }
}
