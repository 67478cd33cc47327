//! Message handlers for the Tracker
//!
//! Every handler runs with the ledger lock held by `Tracker::handle_message`
//! and receives the guarded ledger directly.

use super::Tracker;
use crate::domain::types::{Direction, LocationEvent, PresenceUpdate, TransitionEvent, TransitionKind};
use crate::services::ledger::RegionLedger;
use tracing::{debug, info};

impl Tracker {
    /// Handle a GPS fix
    ///
    /// Dropped when inaccurate, or when the device is inside a region: the
    /// region wins over raw GPS.
    pub(crate) fn handle_location(&self, ledger: &mut RegionLedger, event: LocationEvent) {
        if self.exceeds_max_accuracy(event.accuracy) {
            self.metrics.record_inaccurate_dropped();
            debug!(
                dev_id = %event.device,
                accuracy = ?event.accuracy,
                max = ?self.max_gps_accuracy,
                "location_ignored_inaccurate"
            );
            return;
        }

        if let Some(region) = ledger.current_region(&event.device) {
            self.metrics.record_region_suppressed();
            debug!(dev_id = %event.device, region = %region, "location_ignored_inside_region");
            return;
        }

        let update = PresenceUpdate::from_location(&event);
        self.see(ledger, update);
    }

    /// Handle a geofence or beacon transition
    pub(crate) fn handle_transition(&self, ledger: &mut RegionLedger, event: TransitionEvent) {
        let location = event.location_name();

        match event.direction {
            Direction::Enter => self.handle_enter(ledger, &event, location),
            Direction::Leave => self.handle_leave(ledger, &event, location),
        }
    }

    fn handle_enter(&self, ledger: &mut RegionLedger, event: &TransitionEvent, location: String) {
        let mut update = PresenceUpdate::from_transition(event);

        match self.zones.lookup_zone(&location) {
            Some(zone) => {
                // Passive zones snap coordinates but never become the display name
                if !zone.passive {
                    update.location_name = Some(location.clone());
                }
                ledger.enter_region(&event.device, &location);
                update.set_gps_from_zone(Some(&zone));
                info!(dev_id = %event.device, region = %location, passive = %zone.passive, "region_enter");
            }
            None if event.kind == TransitionKind::Beacon => {
                // Not a zone, so a mobile beacon: it shows up through fanout
                if ledger.set_beacon_active(&event.device, &location) {
                    info!(dev_id = %event.device, beacon = %location, "beacon_added");
                }
                return;
            }
            None => {
                info!(dev_id = %event.device, location = %location, "enter_unknown_location");
                update.location_name = Some(location);
            }
        }

        self.see(ledger, update);
    }

    fn handle_leave(&self, ledger: &mut RegionLedger, event: &TransitionEvent, location: String) {
        let mut update = PresenceUpdate::from_transition(event);

        match ledger.exit_region(&event.device, &location) {
            Some(region) => {
                let zone = self.zones.lookup_zone(&region);
                if !zone.as_ref().is_some_and(|z| z.passive) {
                    update.location_name = Some(region.clone());
                }
                update.set_gps_from_zone(zone.as_ref());
                info!(dev_id = %event.device, left = %location, region = %region, "region_exit_to_region");
                self.see(ledger, update);
            }
            None if self.exceeds_max_accuracy(event.accuracy) => {
                self.metrics.record_inaccurate_dropped();
                info!(
                    dev_id = %event.device,
                    left = %location,
                    accuracy = ?event.accuracy,
                    "region_exit_inaccurate_gps"
                );
            }
            None => {
                info!(dev_id = %event.device, left = %location, "region_exit_to_gps");
                self.see(ledger, update);
            }
        }

        if ledger.set_beacon_inactive(&event.device, &location) {
            info!(dev_id = %event.device, beacon = %location, "beacon_removed");
        }
    }

    /// Emit an update for the device, then one for each of its active beacons
    fn see(&self, ledger: &RegionLedger, update: PresenceUpdate) {
        self.sink.see(&update);
        self.metrics.record_update_emitted();
        self.see_beacons(ledger, &update);
    }

    /// Beacon fanout: every active beacon inherits the owner's resolved location
    fn see_beacons(&self, ledger: &RegionLedger, update: &PresenceUpdate) {
        for beacon in ledger.active_beacons(&update.dev_id) {
            let beacon_update = update.for_beacon(beacon);
            debug!(dev_id = %update.dev_id, beacon = %beacon, "beacon_update");
            self.sink.see(&beacon_update);
            self.metrics.record_beacon_update_emitted();
        }
    }
}
