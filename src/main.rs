//! OwnTracks presence tracker
//!
//! Consumes OwnTracks location and transition messages over MQTT, keeps
//! per-device region and beacon state, and publishes normalized presence
//! updates.
//!
//! Module structure:
//! - `domain/` - Core types (events, presence updates, zones, errors)
//! - `io/` - External interfaces (MQTT ingress/egress, decoder, Prometheus)
//! - `services/` - Business logic (Tracker, RegionLedger, zones, sink)
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use clap::Parser;
use owntracks_presence::infra::{Config, Metrics};
use owntracks_presence::io::{create_egress_channel, MqttPublisher};
use owntracks_presence::services::{LogSink, PresenceSink, StaticZones, Tracker};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// OwnTracks presence tracker
#[derive(Parser, Debug)]
#[command(name = "owntracks-presence", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-message visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = env!("GIT_HASH"), "owntracks-presence starting");

    let args = Args::parse();
    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        topic_prefix = %config.topic_prefix(),
        max_gps_accuracy = ?config.max_gps_accuracy(),
        zones = %config.zones().len(),
        egress_enabled = %config.egress_enabled(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    owntracks_presence::infra::broker::start_embedded_broker(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Sink: MQTT egress when enabled, log-only otherwise
    let sink: Arc<dyn PresenceSink> = if config.egress_enabled() {
        let (egress_sender, egress_rx) =
            create_egress_channel(config.egress_channel_capacity(), metrics.clone());
        let publisher = MqttPublisher::new(&config, egress_rx);
        let publisher_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            publisher.run(publisher_shutdown).await;
        });
        Arc::new(egress_sender)
    } else {
        Arc::new(LogSink)
    };

    let zones = Arc::new(StaticZones::from_config(&config));
    let tracker = Arc::new(Tracker::new(&config, zones, sink, metrics.clone()));
    info!("tracker_started");

    // Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_tracker = tracker.clone();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = owntracks_presence::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_tracker,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Periodic metrics log
    let report_metrics = metrics.clone();
    let report_tracker = tracker.clone();
    let interval_secs = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            report_metrics.report(report_tracker.tracked_devices()).log();
        }
    });

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Runs until shutdown
    if let Err(e) =
        owntracks_presence::io::mqtt::start_mqtt_client(&config, tracker, shutdown_rx).await
    {
        anyhow::bail!("MQTT client error: {}", e);
    }

    info!("owntracks-presence shutdown complete");
    Ok(())
}
