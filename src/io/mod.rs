//! IO modules - external system interfaces
//!
//! - `decoder` - OwnTracks payload decoding and device key resolution
//! - `mqtt` - MQTT client subscribing to the OwnTracks topic trees
//! - `egress_channel` - Non-blocking presence sink backed by a bounded channel
//! - `mqtt_egress` - MQTT publisher for presence updates
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod decoder;
pub mod egress_channel;
pub mod mqtt;
pub mod mqtt_egress;
pub mod prometheus;

// Re-export commonly used types
pub use decoder::{decode_payload, resolve_device, Decoded, Route};
pub use egress_channel::{create_egress_channel, EgressSender};
pub use mqtt_egress::MqttPublisher;
