//! Integration tests for configuration loading

use owntracks_presence::infra::Config;
use owntracks_presence::services::{StaticZones, ZoneRegistry};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[mqtt]
host = "test-host"
port = 1884
username = "tracker"
password = "secret"

[owntracks]
topic_prefix = "ot"
max_gps_accuracy = 75.5
qos = 0

[[zones]]
name = "home"
latitude = 1.0
longitude = 2.0
radius = 30.0

[[zones]]
name = "Mall"
passive = true
latitude = 3.0
longitude = 4.0
radius = 250.0

[egress]
enabled = false
topic_prefix = "people"

[metrics]
interval_secs = 15
prometheus_port = 9091
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.mqtt_host(), "test-host");
    assert_eq!(config.mqtt_port(), 1884);
    assert_eq!(config.mqtt_username(), Some("tracker"));
    assert_eq!(config.location_topic(), "ot/+/+");
    assert_eq!(config.event_topic(), "ot/+/+/event");
    assert_eq!(config.max_gps_accuracy(), Some(75.5));
    assert_eq!(config.qos(), 0);
    assert!(!config.egress_enabled());
    assert_eq!(config.egress_topic_prefix(), "people");
    assert_eq!(config.prometheus_port(), 9091);
    assert!(!config.broker_enabled());

    let zones = StaticZones::from_config(&config);
    assert_eq!(zones.len(), 2);
    assert!(!zones.lookup_zone("home").unwrap().passive);
    assert!(zones.lookup_zone("Mall").unwrap().passive);
}

#[test]
fn test_invalid_qos_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(b"[mqtt]\nhost = \"h\"\nport = 1883\n\n[owntracks]\nqos = 3\n")
        .unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.mqtt_host(), "localhost");
    assert_eq!(config.mqtt_port(), 1883);
    assert_eq!(config.max_gps_accuracy(), None);
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_zero_egress_capacity_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(b"[mqtt]\nhost = \"h\"\nport = 1883\n\n[egress]\nchannel_capacity = 0\n")
        .unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(err.to_string().contains("channel_capacity"));
}
