//! Shared types for the presence tracker

use serde::{Deserialize, Deserializer, Serialize};

/// Location name reported when a device is at its home zone
pub const STATE_HOME: &str = "home";

/// Device key prefix for mobile beacons riding along with a tracked device
pub const BEACON_DEV_ID: &str = "beacon";

/// OwnTracks prefixes a beacon region with this marker to switch on "hold mode"
pub const HOLD_MODE_MARKER: char = '-';

/// Newtype wrapper for device keys (`<host>_<device>`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(pub String);

impl DeviceKey {
    /// Key used for the virtual device that mirrors a mobile beacon
    pub fn beacon(name: &str) -> Self {
        Self(format!("{}_{}", BEACON_DEV_ID, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A GPS fix (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gps {
    pub lat: f64,
    pub lon: f64,
}

impl Gps {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Raw OwnTracks message body
///
/// Only the fields this tracker reads are declared; everything else in the
/// payload is ignored. Required-ness depends on `_type` and is checked by the
/// decoder, not by serde.
#[derive(Debug, Default, Deserialize)]
pub struct OwnTracksMessage {
    #[serde(rename = "_type")]
    pub msg_type: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub acc: Option<f64>,
    #[serde(default, deserialize_with = "battery_percent")]
    pub batt: Option<u8>,
    pub desc: Option<String>,
    pub event: Option<String>,
    pub t: Option<String>,
}

/// Battery level is informational; anything other than a number in 0..=100
/// reads as absent instead of failing the message.
fn battery_percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(serde_json::Value::as_f64)
        .filter(|pct| (0.0..=100.0).contains(pct))
        .map(|pct| pct.round() as u8))
}

/// A `_type: location` message
#[derive(Debug, Clone, PartialEq)]
pub struct LocationEvent {
    pub device: DeviceKey,
    pub host_name: String,
    pub gps: Gps,
    pub accuracy: Option<f64>,
    pub battery: Option<u8>,
}

/// What a transition refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Circular geofence (`t` other than `b`)
    Region,
    /// BLE beacon region (`t == "b"`)
    Beacon,
}

impl TransitionKind {
    pub fn from_trigger(t: &str) -> Self {
        if t == "b" {
            Self::Beacon
        } else {
            Self::Region
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Enter,
    Leave,
}

impl std::str::FromStr for Direction {
    type Err = crate::domain::PresenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enter" => Ok(Self::Enter),
            "leave" => Ok(Self::Leave),
            other => Err(crate::domain::PresenceError::UnknownEvent(other.to_string())),
        }
    }
}

/// A `_type: transition` message
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionEvent {
    pub device: DeviceKey,
    pub host_name: String,
    /// Region or beacon name as sent, hold-mode marker included
    pub desc: String,
    pub kind: TransitionKind,
    pub direction: Direction,
    pub gps: Option<Gps>,
    pub accuracy: Option<f64>,
    pub battery: Option<u8>,
}

impl TransitionEvent {
    /// Name used for zone lookup and ledger bookkeeping.
    ///
    /// Strips the hold-mode marker and maps any casing of "home" to
    /// [`STATE_HOME`].
    pub fn location_name(&self) -> String {
        let location = self.desc.trim_start_matches(HOLD_MODE_MARKER);
        if location.eq_ignore_ascii_case(STATE_HOME) {
            STATE_HOME.to_string()
        } else {
            location.to_string()
        }
    }
}

/// Registered geofence
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Zone {
    pub name: String,
    #[serde(default)]
    pub passive: bool,
    pub latitude: f64,
    pub longitude: f64,
    /// Radius in meters
    pub radius: f64,
}

/// Normalized update handed to the presence sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceUpdate {
    pub dev_id: DeviceKey,
    pub host_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps: Option<Gps>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<u8>,
}

impl PresenceUpdate {
    pub fn from_location(event: &LocationEvent) -> Self {
        Self {
            dev_id: event.device.clone(),
            host_name: event.host_name.clone(),
            location_name: None,
            gps: Some(event.gps),
            gps_accuracy: event.accuracy,
            battery: event.battery,
        }
    }

    pub fn from_transition(event: &TransitionEvent) -> Self {
        Self {
            dev_id: event.device.clone(),
            host_name: event.host_name.clone(),
            location_name: None,
            gps: event.gps,
            gps_accuracy: event.accuracy,
            battery: event.battery,
        }
    }

    /// Snap coordinates to the zone center, accuracy to its radius.
    /// No zone leaves the update untouched.
    pub fn set_gps_from_zone(&mut self, zone: Option<&Zone>) {
        if let Some(zone) = zone {
            self.gps = Some(Gps::new(zone.latitude, zone.longitude));
            self.gps_accuracy = Some(zone.radius);
        }
    }

    /// Copy of this update re-addressed to a mobile beacon.
    ///
    /// Battery belongs to the tracking device, so it is not carried over.
    pub fn for_beacon(&self, beacon: &str) -> Self {
        Self {
            dev_id: DeviceKey::beacon(beacon),
            host_name: beacon.to_string(),
            location_name: self.location_name.clone(),
            gps: self.gps,
            gps_accuracy: self.gps_accuracy,
            battery: None,
        }
    }
}
