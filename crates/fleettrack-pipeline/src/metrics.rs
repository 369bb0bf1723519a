//! Metrics Collection
//!
//! In-process counters for the tracking pipeline, mirrored into the
//! `metrics` facade for whatever recorder the host process installs.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use std::sync::atomic::{AtomicU64, Ordering};

/// Ingestion counters.
#[derive(Debug)]
pub struct IngestMetrics {
    samples_received: AtomicU64,
    samples_rejected: AtomicU64,
    updates_published: AtomicU64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        describe_counter!(
            "tracker_samples_received_total",
            "Position samples accepted into the pipeline"
        );
        describe_counter!(
            "tracker_samples_rejected_total",
            "Position samples rejected by validation"
        );
        describe_counter!(
            "tracker_updates_published_total",
            "Broadcast publishes triggered by resolved samples"
        );

        Self {
            samples_received: AtomicU64::new(0),
            samples_rejected: AtomicU64::new(0),
            updates_published: AtomicU64::new(0),
        }
    }

    pub fn record_received(&self) {
        self.samples_received.fetch_add(1, Ordering::Relaxed);
        counter!("tracker_samples_received_total").increment(1);
    }

    pub fn record_rejected(&self) {
        self.samples_rejected.fetch_add(1, Ordering::Relaxed);
        counter!("tracker_samples_rejected_total").increment(1);
    }

    pub fn record_published(&self) {
        self.updates_published.fetch_add(1, Ordering::Relaxed);
        counter!("tracker_updates_published_total").increment(1);
    }

    pub fn samples_received(&self) -> u64 {
        self.samples_received.load(Ordering::Relaxed)
    }

    pub fn samples_rejected(&self) -> u64 {
        self.samples_rejected.load(Ordering::Relaxed)
    }

    pub fn updates_published(&self) -> u64 {
        self.updates_published.load(Ordering::Relaxed)
    }
}

impl Default for IngestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Write-behind batcher counters.
#[derive(Debug)]
pub struct BatcherMetrics {
    flushes: AtomicU64,
    samples_persisted: AtomicU64,
    flush_failures: AtomicU64,
    samples_dropped: AtomicU64,
}

impl BatcherMetrics {
    pub fn new() -> Self {
        describe_counter!("batcher_flushes_total", "Successful batch flushes");
        describe_counter!(
            "batcher_samples_persisted_total",
            "Samples persisted to the durable store"
        );
        describe_counter!("batcher_flush_failures_total", "Failed batch flushes");
        describe_counter!(
            "batcher_samples_dropped_total",
            "Samples dropped at the retention buffer limit"
        );

        Self {
            flushes: AtomicU64::new(0),
            samples_persisted: AtomicU64::new(0),
            flush_failures: AtomicU64::new(0),
            samples_dropped: AtomicU64::new(0),
        }
    }

    pub fn record_flush(&self, samples: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.samples_persisted
            .fetch_add(samples as u64, Ordering::Relaxed);
        counter!("batcher_flushes_total").increment(1);
        counter!("batcher_samples_persisted_total").increment(samples as u64);
    }

    pub fn record_failure(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
        counter!("batcher_flush_failures_total").increment(1);
    }

    pub fn record_dropped(&self, samples: usize) {
        self.samples_dropped
            .fetch_add(samples as u64, Ordering::Relaxed);
        counter!("batcher_samples_dropped_total").increment(samples as u64);
    }

    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn samples_persisted(&self) -> u64 {
        self.samples_persisted.load(Ordering::Relaxed)
    }

    pub fn flush_failures(&self) -> u64 {
        self.flush_failures.load(Ordering::Relaxed)
    }

    pub fn samples_dropped(&self) -> u64 {
        self.samples_dropped.load(Ordering::Relaxed)
    }
}

impl Default for BatcherMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Broadcast router counters.
#[derive(Debug)]
pub struct RouterMetrics {
    updates_delivered: AtomicU64,
    delivery_failures: AtomicU64,
}

impl RouterMetrics {
    pub fn new() -> Self {
        describe_counter!(
            "router_updates_delivered_total",
            "Position updates delivered to subscribers"
        );
        describe_counter!(
            "router_delivery_failures_total",
            "Per-subscriber delivery failures (dead channels)"
        );
        describe_gauge!(
            "tracker_connections_active",
            "Currently admitted gateway connections"
        );

        Self {
            updates_delivered: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
        }
    }

    pub fn record_delivered(&self) {
        self.updates_delivered.fetch_add(1, Ordering::Relaxed);
        counter!("router_updates_delivered_total").increment(1);
    }

    pub fn record_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
        counter!("router_delivery_failures_total").increment(1);
    }

    pub fn updates_delivered(&self) -> u64 {
        self.updates_delivered.load(Ordering::Relaxed)
    }

    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }
}

impl Default for RouterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Updates the live-connection gauge; called by the registry.
pub fn set_connection_gauge(count: usize) {
    gauge!("tracker_connections_active").set(count as f64);
}
