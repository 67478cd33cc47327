//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::Zone;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_client_id() -> String {
    "owntracks-presence".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnTracksConfig {
    /// First topic segment of the OwnTracks tree
    #[serde(default = "default_owntracks_prefix")]
    pub topic_prefix: String,
    /// Fixes reporting a worse accuracy (meters) are dropped. Absent = no filtering.
    #[serde(default)]
    pub max_gps_accuracy: Option<f64>,
    /// Subscription QoS (0, 1 or 2)
    #[serde(default = "default_qos")]
    pub qos: u8,
}

impl Default for OwnTracksConfig {
    fn default() -> Self {
        Self { topic_prefix: default_owntracks_prefix(), max_gps_accuracy: None, qos: default_qos() }
    }
}

fn default_owntracks_prefix() -> String {
    "owntracks".to_string()
}

fn default_qos() -> u8 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// Publish presence updates over MQTT (otherwise they are only logged)
    #[serde(default = "default_egress_enabled")]
    pub enabled: bool,
    /// Updates go to `<topic_prefix>/<dev_id>`
    #[serde(default = "default_egress_prefix")]
    pub topic_prefix: String,
    /// Bounded queue between the tracker and the publisher
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            enabled: default_egress_enabled(),
            topic_prefix: default_egress_prefix(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_egress_enabled() -> bool {
    true
}

fn default_egress_prefix() -> String {
    "presence".to_string()
}

fn default_channel_capacity() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default)]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: 0 }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Run an embedded broker (local development only)
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_broker_bind_address(),
            port: default_broker_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub owntracks: OwnTracksConfig,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_client_id: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    topic_prefix: String,
    max_gps_accuracy: Option<f64>,
    qos: u8,
    zones: Vec<Zone>,
    egress_enabled: bool,
    egress_topic_prefix: String,
    egress_channel_capacity: usize,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    broker_enabled: bool,
    broker_bind_address: String,
    broker_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_client_id: default_client_id(),
            mqtt_username: None,
            mqtt_password: None,
            topic_prefix: default_owntracks_prefix(),
            max_gps_accuracy: None,
            qos: default_qos(),
            zones: Vec::new(),
            egress_enabled: default_egress_enabled(),
            egress_topic_prefix: default_egress_prefix(),
            egress_channel_capacity: default_channel_capacity(),
            metrics_interval_secs: default_metrics_interval(),
            prometheus_port: 0,
            broker_enabled: false,
            broker_bind_address: default_broker_bind_address(),
            broker_port: default_broker_port(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from the CLI value or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        if toml_config.owntracks.qos > 2 {
            anyhow::bail!("invalid owntracks.qos {} in {}", toml_config.owntracks.qos, path.display());
        }
        if toml_config.egress.channel_capacity == 0 {
            anyhow::bail!("egress.channel_capacity must be at least 1 in {}", path.display());
        }

        Ok(Self {
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_client_id: toml_config.mqtt.client_id,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            topic_prefix: toml_config.owntracks.topic_prefix,
            max_gps_accuracy: toml_config.owntracks.max_gps_accuracy,
            qos: toml_config.owntracks.qos,
            zones: toml_config.zones,
            egress_enabled: toml_config.egress.enabled,
            egress_topic_prefix: toml_config.egress.topic_prefix,
            egress_channel_capacity: toml_config.egress.channel_capacity,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            broker_enabled: toml_config.broker.enabled,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Subscription filter for location messages
    pub fn location_topic(&self) -> String {
        format!("{}/+/+", self.topic_prefix)
    }

    /// Subscription filter for transition messages
    pub fn event_topic(&self) -> String {
        format!("{}/+/+/event", self.topic_prefix)
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_client_id(&self) -> &str {
        &self.mqtt_client_id
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    pub fn max_gps_accuracy(&self) -> Option<f64> {
        self.max_gps_accuracy
    }

    pub fn qos(&self) -> u8 {
        self.qos
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn egress_enabled(&self) -> bool {
        self.egress_enabled
    }

    pub fn egress_topic_prefix(&self) -> &str {
        &self.egress_topic_prefix
    }

    pub fn egress_channel_capacity(&self) -> usize {
        self.egress_channel_capacity
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn broker_enabled(&self) -> bool {
        self.broker_enabled
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to set the accuracy threshold
    pub fn with_max_gps_accuracy(mut self, max: Option<f64>) -> Self {
        self.max_gps_accuracy = max;
        self
    }

    /// Builder method to replace the zone list
    pub fn with_zones(mut self, zones: Vec<Zone>) -> Self {
        self.zones = zones;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt_host(), "localhost");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.topic_prefix(), "owntracks");
        assert_eq!(config.max_gps_accuracy(), None);
        assert_eq!(config.qos(), 1);
        assert!(config.zones().is_empty());
        assert!(!config.broker_enabled());
    }

    #[test]
    fn test_subscription_topics() {
        let config = Config::default();
        assert_eq!(config.location_topic(), "owntracks/+/+");
        assert_eq!(config.event_topic(), "owntracks/+/+/event");
    }

    #[test]
    fn test_resolve_config_path_from_cli() {
        assert_eq!(Config::resolve_config_path(Some("config/home.toml")), "config/home.toml");
    }

    #[test]
    fn test_builders() {
        let zone = Zone {
            name: "home".to_string(),
            passive: false,
            latitude: 1.0,
            longitude: 2.0,
            radius: 30.0,
        };
        let config =
            Config::default().with_max_gps_accuracy(Some(200.0)).with_zones(vec![zone.clone()]);
        assert_eq!(config.max_gps_accuracy(), Some(200.0));
        assert_eq!(config.zones(), &[zone]);
    }

    #[test]
    fn test_owntracks_section_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[mqtt]
host = "broker"
port = 1883
"#,
        )
        .unwrap();
        assert_eq!(toml_config.owntracks.topic_prefix, "owntracks");
        assert_eq!(toml_config.owntracks.qos, 1);
        assert!(toml_config.egress.enabled);
        assert_eq!(toml_config.egress.topic_prefix, "presence");
        assert!(toml_config.zones.is_empty());
    }
}
