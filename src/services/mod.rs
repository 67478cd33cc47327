//! Services - presence reconciliation and its collaborators
//!
//! - `tracker` - Applies location/transition messages and emits presence updates
//! - `ledger` - Per-device entered regions and active mobile beacons
//! - `zones` - Zone registry contract and the config-backed implementation
//! - `sink` - Presence sink contract

pub mod ledger;
pub mod sink;
pub mod tracker;
pub mod zones;

// Re-export commonly used types
pub use ledger::RegionLedger;
pub use sink::{LogSink, PresenceSink};
pub use tracker::Tracker;
pub use zones::{StaticZones, ZoneRegistry};
