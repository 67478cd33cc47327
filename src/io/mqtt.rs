//! MQTT client for receiving OwnTracks messages
//!
//! Subscribes to the location tree (`<prefix>/+/+`) and the transition tree
//! (`<prefix>/+/+/event`) and hands every publish to the tracker. The tracker
//! call is synchronous and only touches in-memory state plus a non-blocking
//! sink, so it runs directly on the eventloop task.

use crate::infra::config::Config;
use crate::io::decoder::Route;
use crate::services::tracker::Tracker;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Map a configured QoS level to the rumqttc enum
pub fn qos_from_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

/// Start the MQTT client and feed OwnTracks messages to the tracker
///
/// Subscriptions are (re)issued on every ConnAck so they survive broker
/// reconnects with a clean session.
pub async fn start_mqtt_client(
    config: &Config,
    tracker: Arc<Tracker>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut mqttoptions =
        MqttOptions::new(config.mqtt_client_id(), config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    // Set credentials if configured
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    let qos = qos_from_level(config.qos());
    let topics = [config.location_topic(), config.event_topic()];

    info!(host = %config.mqtt_host(), port = %config.mqtt_port(), topics = ?topics, "mqtt_client_starting");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match Route::from_topic(&publish.topic) {
                            Some(route) => {
                                tracker.handle_message(route, &publish.topic, &publish.payload);
                            }
                            None => {
                                debug!(topic = %publish.topic, "mqtt_topic_not_routed");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_connected");
                        for topic in &topics {
                            if let Err(e) = client.try_subscribe(topic.as_str(), qos) {
                                warn!(topic = %topic, error = %e, "mqtt_subscribe_failed");
                            } else {
                                info!(topic = %topic, qos = ?qos, "mqtt_subscribed");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
