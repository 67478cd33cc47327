//! MQTT publisher for presence updates
//!
//! Each update is published as JSON to `<egress_prefix>/<dev_id>` with QoS 1
//! and the retain flag set, so late subscribers see the last known presence.

use crate::domain::types::PresenceUpdate;
use crate::infra::config::Config;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Topic an update is published to
pub fn presence_topic(prefix: &str, update: &PresenceUpdate) -> String {
    format!("{}/{}", prefix, update.dev_id)
}

/// MQTT publisher actor
///
/// Receives updates from the egress channel and publishes them.
pub struct MqttPublisher {
    client: AsyncClient,
    rx: mpsc::Receiver<PresenceUpdate>,
    topic_prefix: String,
}

impl MqttPublisher {
    /// Create a new MQTT publisher
    ///
    /// Connects to the broker at the configured MQTT host/port.
    pub fn new(config: &Config, rx: mpsc::Receiver<PresenceUpdate>) -> Self {
        let client_id = format!("{}-egress-{}", config.mqtt_client_id(), std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        // Spawn the eventloop handler
        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_egress_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) => {
                        debug!("mqtt_egress_puback");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_egress_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self { client, rx, topic_prefix: config.egress_topic_prefix().to_string() }
    }

    /// Run the publisher loop until shutdown, draining queued updates on exit
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(prefix = %self.topic_prefix, "mqtt_egress_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("mqtt_egress_shutdown");
                        while let Ok(update) = self.rx.try_recv() {
                            self.publish(update).await;
                        }
                        return;
                    }
                }
                msg = self.rx.recv() => {
                    match msg {
                        Some(update) => self.publish(update).await,
                        None => {
                            info!("mqtt_egress_channel_closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn publish(&self, update: PresenceUpdate) {
        let topic = presence_topic(&self.topic_prefix, &update);
        let json = match serde_json::to_vec(&update) {
            Ok(json) => json,
            Err(e) => {
                error!(dev_id = %update.dev_id, error = %e, "mqtt_egress_serialize_failed");
                return;
            }
        };

        if let Err(e) = self.client.publish(topic.as_str(), QoS::AtLeastOnce, true, json).await {
            warn!(topic = %topic, error = %e, "mqtt_egress_publish_failed");
        } else {
            debug!(topic = %topic, "mqtt_egress_published");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::DeviceKey;

    #[test]
    fn test_presence_topic() {
        let update = PresenceUpdate {
            dev_id: DeviceKey::beacon("Keys"),
            host_name: "Keys".to_string(),
            location_name: Some("home".to_string()),
            gps: None,
            gps_accuracy: None,
            battery: None,
        };
        assert_eq!(presence_topic("presence", &update), "presence/beacon_Keys");
    }
}
