//! Prometheus metrics HTTP endpoint
//!
//! Exposes tracker metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::tracker::Tracker;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum {sum}");
    let _ = writeln!(output, "{name}_count {count}");
}

/// Format a summary in Prometheus text exposition format
fn format_prometheus_metrics(summary: &MetricsSummary) -> String {
    let mut output = String::with_capacity(4096);

    let counters = [
        ("owntracks_messages_total", "MQTT messages processed", summary.messages_total),
        ("owntracks_decode_errors_total", "Messages dropped as malformed", summary.decode_errors),
        (
            "owntracks_protocol_errors_total",
            "Transitions dropped for an unknown event value",
            summary.protocol_errors,
        ),
        ("owntracks_messages_ignored_total", "Messages of unhandled types", summary.messages_ignored),
        ("owntracks_updates_total", "Presence updates emitted for devices", summary.updates_emitted),
        (
            "owntracks_beacon_updates_total",
            "Presence updates emitted for mobile beacons",
            summary.beacon_updates_emitted,
        ),
        (
            "owntracks_region_suppressed_total",
            "Location fixes ignored while inside a region",
            summary.region_suppressed,
        ),
        (
            "owntracks_inaccurate_dropped_total",
            "Fixes dropped for exceeding max_gps_accuracy",
            summary.inaccurate_dropped,
        ),
        ("owntracks_egress_dropped_total", "Updates dropped by the egress queue", summary.egress_dropped),
    ];
    for (name, help, val) in counters {
        write_metric(&mut output, name, help, MetricType::Counter, val);
    }

    write_metric(
        &mut output,
        "owntracks_tracked_devices",
        "Devices with region or beacon state",
        MetricType::Gauge,
        summary.tracked_devices as u64,
    );
    write_histogram(
        &mut output,
        "owntracks_message_latency_us",
        "Message processing latency in microseconds",
        &summary.lat_buckets,
        summary.lat_sum_us,
    );

    output
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    tracker: Arc<Tracker>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let summary = metrics.snapshot(tracker.tracked_devices());
            let mut response = text_response(StatusCode::OK, format_prometheus_metrics(&summary));
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
            );
            Ok(response)
        }
        (&Method::GET, "/health") => Ok(text_response(StatusCode::OK, "ok".to_string())),
        _ => Ok(text_response(StatusCode::NOT_FOUND, "Not Found".to_string())),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    tracker: Arc<Tracker>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let tracker = tracker.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handle_request(req, metrics.clone(), tracker.clone())
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_message_processed(150);
        metrics.record_message_processed(250);
        metrics.record_update_emitted();
        metrics.record_decode_error();

        let output = format_prometheus_metrics(&metrics.snapshot(4));

        assert!(output.contains("owntracks_messages_total 2"));
        assert!(output.contains("owntracks_updates_total 1"));
        assert!(output.contains("owntracks_decode_errors_total 1"));
        assert!(output.contains("owntracks_tracked_devices 4"));
        assert!(output.contains("owntracks_message_latency_us_bucket{le=\"200\"} 1"));
        assert!(output.contains("owntracks_message_latency_us_bucket{le=\"+Inf\"} 2"));
        assert!(output.contains("owntracks_message_latency_us_sum 400"));
        assert!(output.contains("# TYPE owntracks_tracked_devices gauge"));
    }

    #[test]
    fn test_repeated_scrapes_keep_histogram() {
        let metrics = Metrics::new();
        metrics.record_message_processed(150);

        let first = format_prometheus_metrics(&metrics.snapshot(0));
        assert!(first.contains("owntracks_message_latency_us_count 1"));

        metrics.record_message_processed(90);
        let second = format_prometheus_metrics(&metrics.snapshot(0));
        assert!(second.contains("owntracks_message_latency_us_bucket{le=\"100\"} 1"));
        assert!(second.contains("owntracks_message_latency_us_bucket{le=\"200\"} 2"));
        assert!(second.contains("owntracks_message_latency_us_count 2"));
        assert!(second.contains("owntracks_message_latency_us_sum 240"));
    }
}
