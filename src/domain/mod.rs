//! Domain models - core presence types and errors
//!
//! This module contains the canonical data types used throughout the system:
//! - `LocationEvent` / `TransitionEvent` - decoded OwnTracks messages
//! - `PresenceUpdate` - normalized update handed to the presence sink
//! - `Zone` - registered geofence (center + radius)
//! - `PresenceError` - decode and protocol failures

pub mod error;
pub mod types;

// Re-export commonly used types at module level
pub use error::PresenceError;
pub use types::{
    DeviceKey, Direction, Gps, LocationEvent, PresenceUpdate, TransitionEvent, TransitionKind,
    Zone,
};
