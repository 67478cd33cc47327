//! Per-device region and mobile beacon bookkeeping
//!
//! Regions are kept in entry order and behave as a stack: the most recently
//! entered region that is still active is the device's current region. Beacons
//! are kept in activation order. Both lists suppress duplicates and never hold
//! empty names.
//!
//! The ledger itself is not synchronized; the tracker owns it behind a single
//! mutex so that each message's read-decide-mutate-emit sequence is atomic.

use crate::domain::types::DeviceKey;
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct RegionLedger {
    /// Entered regions per device, oldest first
    regions_entered: FxHashMap<DeviceKey, Vec<String>>,
    /// Active mobile beacons per device, oldest first
    beacons_active: FxHashMap<DeviceKey, Vec<String>>,
}

/// Append `name` unless already present. Returns true if inserted.
fn insert_unique(map: &mut FxHashMap<DeviceKey, Vec<String>>, device: &DeviceKey, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let names = map.entry(device.clone()).or_default();
    if names.iter().any(|n| n == name) {
        return false;
    }
    names.push(name.to_string());
    true
}

/// Remove `name` if present. Returns true if removed.
fn remove_value(map: &mut FxHashMap<DeviceKey, Vec<String>>, device: &DeviceKey, name: &str) -> bool {
    let Some(names) = map.get_mut(device) else { return false };
    let Some(pos) = names.iter().position(|n| n == name) else { return false };
    names.remove(pos);
    if names.is_empty() {
        map.remove(device);
    }
    true
}

impl RegionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Regions the device is inside, oldest first (empty for unknown devices)
    pub fn current_regions(&self, device: &DeviceKey) -> &[String] {
        self.regions_entered.get(device).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Most recently entered region still active
    pub fn current_region(&self, device: &DeviceKey) -> Option<&str> {
        self.current_regions(device).last().map(String::as_str)
    }

    /// Record entry into a region; no-op if already inside it
    pub fn enter_region(&mut self, device: &DeviceKey, name: &str) -> bool {
        insert_unique(&mut self.regions_entered, device, name)
    }

    /// Record exit from a region and return the region now on top, if any.
    ///
    /// Exiting a region that was never entered still reports the current top.
    pub fn exit_region(&mut self, device: &DeviceKey, name: &str) -> Option<String> {
        remove_value(&mut self.regions_entered, device, name);
        self.current_region(device).map(str::to_string)
    }

    /// Mobile beacons in range of the device, oldest first
    pub fn active_beacons(&self, device: &DeviceKey) -> &[String] {
        self.beacons_active.get(device).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_beacon_active(&mut self, device: &DeviceKey, name: &str) -> bool {
        insert_unique(&mut self.beacons_active, device, name)
    }

    pub fn set_beacon_inactive(&mut self, device: &DeviceKey, name: &str) -> bool {
        remove_value(&mut self.beacons_active, device, name)
    }

    /// Number of devices with at least one region or beacon recorded
    pub fn tracked_devices(&self) -> usize {
        let mut keys: Vec<&DeviceKey> =
            self.regions_entered.keys().chain(self.beacons_active.keys()).collect();
        keys.sort();
        keys.dedup();
        keys.len()
    }

    /// Drop all state
    pub fn clear(&mut self) {
        self.regions_entered.clear();
        self.beacons_active.clear();
    }
}
