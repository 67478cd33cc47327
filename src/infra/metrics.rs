//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations so recording never contends with the
//! tracker's ledger lock. `report()` swaps the periodic counters to zero for
//! the log line; `snapshot()` reads the cumulative view for Prometheus scrapes.
//!
//! NOTE: All atomics use Relaxed ordering intentionally; these are statistical
//! counters only. Do NOT use them for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].load(Ordering::Relaxed))
}

#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Last bucket uses 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// MQTT publishes handed to the tracker (monotonic)
    messages_received: AtomicU64,
    /// Messages processed since last report (reset on report)
    messages_since_report: AtomicU64,
    /// Malformed payload/topic/missing field (monotonic)
    decode_errors: AtomicU64,
    /// Unrecognized transition event (monotonic)
    protocol_errors: AtomicU64,
    /// Valid JSON of a type this tracker does not handle (monotonic)
    messages_ignored: AtomicU64,
    /// Updates sent to the sink for tracked devices (monotonic)
    updates_emitted: AtomicU64,
    /// Updates sent to the sink for mobile beacons (monotonic)
    beacon_updates_emitted: AtomicU64,
    /// Location fixes suppressed because the device is inside a region (monotonic)
    region_suppressed: AtomicU64,
    /// Fixes dropped for exceeding max_gps_accuracy (monotonic)
    inaccurate_dropped: AtomicU64,
    /// Updates dropped because the egress channel was full (monotonic)
    egress_dropped: AtomicU64,
    /// Sum of processing latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max processing latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Processing latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of processing latencies in microseconds (monotonic)
    latency_total_sum_us: AtomicU64,
    /// Processing latency histogram buckets (monotonic)
    latency_total_buckets: [AtomicU64; NUM_BUCKETS],
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_since_report: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            messages_ignored: AtomicU64::new(0),
            updates_emitted: AtomicU64::new(0),
            beacon_updates_emitted: AtomicU64::new(0),
            region_suppressed: AtomicU64::new(0),
            inaccurate_dropped: AtomicU64::new(0),
            egress_dropped: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_total_sum_us: AtomicU64::new(0),
            latency_total_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a fully handled message and its processing latency
    #[inline]
    pub fn record_message_processed(&self, latency_us: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.messages_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_total_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_total_buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_message_ignored(&self) {
        self.messages_ignored.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_update_emitted(&self) {
        self.updates_emitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_beacon_update_emitted(&self) {
        self.beacon_updates_emitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_region_suppressed(&self) {
        self.region_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_inaccurate_dropped(&self) {
        self.inaccurate_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_egress_dropped(&self) {
        self.egress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors.load(Ordering::Relaxed)
    }

    pub fn updates_emitted(&self) -> u64 {
        self.updates_emitted.load(Ordering::Relaxed)
    }

    pub fn egress_dropped(&self) -> u64 {
        self.egress_dropped.load(Ordering::Relaxed)
    }

    /// Take a snapshot, resetting the periodic counters
    pub fn report(&self, tracked_devices: usize) -> MetricsSummary {
        let messages_count = self.messages_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let messages_per_sec = if elapsed.as_secs_f64() > 0.0 {
            messages_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_latency_us = if messages_count > 0 { latency_sum / messages_count } else { 0 };

        self.summary(
            messages_per_sec,
            avg_latency_us,
            max_latency,
            lat_buckets,
            latency_sum,
            tracked_devices,
        )
    }

    /// Cumulative view since startup; resets nothing, so repeated scrapes
    /// see monotonic histogram buckets
    pub fn snapshot(&self, tracked_devices: usize) -> MetricsSummary {
        let lat_buckets = load_buckets(&self.latency_total_buckets);
        let latency_sum = self.latency_total_sum_us.load(Ordering::Relaxed);
        let count: u64 = lat_buckets.iter().sum();
        let avg_latency_us = if count > 0 { latency_sum / count } else { 0 };

        self.summary(
            0.0,
            avg_latency_us,
            self.latency_max_us.load(Ordering::Relaxed),
            lat_buckets,
            latency_sum,
            tracked_devices,
        )
    }

    fn summary(
        &self,
        messages_per_sec: f64,
        avg_latency_us: u64,
        max_latency_us: u64,
        lat_buckets: [u64; NUM_BUCKETS],
        lat_sum_us: u64,
        tracked_devices: usize,
    ) -> MetricsSummary {
        MetricsSummary {
            messages_total: self.messages_received.load(Ordering::Relaxed),
            messages_per_sec,
            avg_latency_us,
            max_latency_us,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_buckets,
            lat_sum_us,
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            messages_ignored: self.messages_ignored.load(Ordering::Relaxed),
            updates_emitted: self.updates_emitted.load(Ordering::Relaxed),
            beacon_updates_emitted: self.beacon_updates_emitted.load(Ordering::Relaxed),
            region_suppressed: self.region_suppressed.load(Ordering::Relaxed),
            inaccurate_dropped: self.inaccurate_dropped.load(Ordering::Relaxed),
            egress_dropped: self.egress_dropped.load(Ordering::Relaxed),
            tracked_devices,
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub messages_total: u64,
    pub messages_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    /// Sum of the latencies counted in `lat_buckets`
    pub lat_sum_us: u64,
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
    pub decode_errors: u64,
    pub protocol_errors: u64,
    pub messages_ignored: u64,
    pub updates_emitted: u64,
    pub beacon_updates_emitted: u64,
    pub region_suppressed: u64,
    pub inaccurate_dropped: u64,
    pub egress_dropped: u64,
    /// Devices with at least one region or beacon in the ledger
    pub tracked_devices: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            messages_total = %self.messages_total,
            messages_per_sec = format!("{:.2}", self.messages_per_sec),
            avg_latency_us = %self.avg_latency_us,
            max_latency_us = %self.max_latency_us,
            p99_us = %self.lat_p99_us,
            decode_errors = %self.decode_errors,
            protocol_errors = %self.protocol_errors,
            updates = %self.updates_emitted,
            beacon_updates = %self.beacon_updates_emitted,
            region_suppressed = %self.region_suppressed,
            inaccurate_dropped = %self.inaccurate_dropped,
            egress_dropped = %self.egress_dropped,
            tracked_devices = %self.tracked_devices,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.messages_received(), 0);
        assert_eq!(metrics.updates_emitted(), 0);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(60000), 10);
    }

    #[test]
    fn test_report_resets_periodic_counters() {
        let metrics = Metrics::new();
        metrics.record_message_processed(150);
        metrics.record_message_processed(250);
        metrics.record_decode_error();
        metrics.record_update_emitted();

        let summary = metrics.report(3);
        assert_eq!(summary.messages_total, 2);
        assert_eq!(summary.avg_latency_us, 200);
        assert_eq!(summary.max_latency_us, 250);
        assert_eq!(summary.lat_buckets[1], 1);
        assert_eq!(summary.lat_buckets[2], 1);
        assert_eq!(summary.decode_errors, 1);
        assert_eq!(summary.updates_emitted, 1);
        assert_eq!(summary.tracked_devices, 3);

        // Monotonic counters survive, periodic ones reset
        let summary = metrics.report(0);
        assert_eq!(summary.messages_total, 2);
        assert_eq!(summary.avg_latency_us, 0);
        assert_eq!(summary.max_latency_us, 0);
        assert_eq!(summary.lat_buckets.iter().sum::<u64>(), 0);
        assert_eq!(summary.decode_errors, 1);
    }

    #[test]
    fn test_snapshot_is_cumulative() {
        let metrics = Metrics::new();
        metrics.record_message_processed(150);

        let first = metrics.snapshot(1);
        assert_eq!(first.lat_buckets[1], 1);
        assert_eq!(first.lat_sum_us, 150);

        metrics.record_message_processed(250);
        // A periodic report in between must not affect the cumulative view
        metrics.report(1);

        let second = metrics.snapshot(1);
        assert_eq!(second.lat_buckets[1], 1);
        assert_eq!(second.lat_buckets[2], 1);
        assert_eq!(second.lat_sum_us, 400);
        assert_eq!(second.avg_latency_us, 200);
        assert_eq!(second.messages_total, 2);
    }

    #[test]
    fn test_percentile_from_buckets() {
        let mut buckets = [0u64; NUM_BUCKETS];
        assert_eq!(percentile_from_buckets(&buckets, 0.99), 0);

        buckets[0] = 99;
        buckets[5] = 1;
        assert_eq!(percentile_from_buckets(&buckets, 0.50), 100);
        assert_eq!(percentile_from_buckets(&buckets, 0.99), 100);
        assert_eq!(percentile_from_buckets(&buckets, 1.0), 3200);
    }

    #[test]
    fn test_update_atomic_max() {
        let max = AtomicU64::new(10);
        update_atomic_max(&max, 5);
        assert_eq!(max.load(Ordering::Relaxed), 10);
        update_atomic_max(&max, 20);
        assert_eq!(max.load(Ordering::Relaxed), 20);
    }
}
