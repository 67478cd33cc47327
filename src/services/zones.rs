//! Zone registry lookup
//!
//! The tracker only needs name → zone resolution. `StaticZones` serves the
//! `[[zones]]` entries from the config file.

use crate::domain::types::Zone;
use crate::infra::config::Config;
use rustc_hash::FxHashMap;

/// Resolves region names to registered zones
pub trait ZoneRegistry: Send + Sync {
    /// `None` means the name is not a stationary zone (possibly a beacon)
    fn lookup_zone(&self, name: &str) -> Option<Zone>;
}

/// Fixed set of zones, looked up case-insensitively by name
#[derive(Debug, Default, Clone)]
pub struct StaticZones {
    zones: FxHashMap<String, Zone>,
}

impl StaticZones {
    pub fn new(zones: impl IntoIterator<Item = Zone>) -> Self {
        Self { zones: zones.into_iter().map(|z| (z.name.to_lowercase(), z)).collect() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.zones().iter().cloned())
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

impl ZoneRegistry for StaticZones {
    fn lookup_zone(&self, name: &str) -> Option<Zone> {
        self.zones.get(&name.to_lowercase()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(name: &str, passive: bool) -> Zone {
        Zone { name: name.to_string(), passive, latitude: 1.0, longitude: 2.0, radius: 100.0 }
    }

    #[test]
    fn test_lookup() {
        let zones = StaticZones::new([zone("home", false), zone("Mall", true)]);
        assert_eq!(zones.len(), 2);
        assert_eq!(zones.lookup_zone("home"), Some(zone("home", false)));
        assert!(zones.lookup_zone("Mall").unwrap().passive);
        assert_eq!(zones.lookup_zone("Gym"), None);
    }

    #[test]
    fn test_lookup_ignores_case() {
        let zones = StaticZones::new([zone("home", false), zone("Work", false)]);
        assert_eq!(zones.lookup_zone("Home"), Some(zone("home", false)));
        assert_eq!(zones.lookup_zone("work"), Some(zone("Work", false)));
        assert_eq!(zones.lookup_zone("WORK").unwrap().name, "Work");
    }

    #[test]
    fn test_from_default_config_is_empty() {
        let zones = StaticZones::from_config(&Config::default());
        assert!(zones.is_empty());
    }
}
