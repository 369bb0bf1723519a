//! Write-Behind Batcher
//!
//! Accumulates position samples and flushes them to the durable store when
//! a size threshold is reached or on a fixed interval, decoupling ingestion
//! rate from storage latency. Producers never wait on storage I/O: a full
//! batch only nudges the flusher task.
//!
//! Persistence is at-least-once. A failed batch is prepended back onto the
//! live buffer in order; the buffer is bounded, and samples arriving past
//! the bound are dropped with an explicit count rather than growing memory
//! without limit.

use fleettrack_core::error::StoreError;
use fleettrack_core::types::PositionSample;
use fleettrack_store::LocationStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::BatcherMetrics;

/// Configuration for the write-behind batcher.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Samples per batch before a size-triggered flush
    pub batch_size: usize,
    /// Interval between timer-driven flushes
    pub flush_interval: Duration,
    /// Deadline for one persistence call
    pub flush_timeout: Duration,
    /// Upper bound on buffered samples, including retained failures
    pub max_buffered: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            flush_interval: Duration::from_secs(10),
            flush_timeout: Duration::from_secs(5),
            max_buffered: 5000,
        }
    }
}

/// Write-behind persistence of position samples.
pub struct WriteBehindBatcher {
    store: Arc<dyn LocationStore>,
    pending: Mutex<Vec<PositionSample>>,
    /// Serializes flushes so two flushers can never swap the same batch.
    flush_gate: tokio::sync::Mutex<()>,
    nudge: Notify,
    draining: AtomicBool,
    config: BatcherConfig,
    metrics: Arc<BatcherMetrics>,
}

impl WriteBehindBatcher {
    pub fn new(store: Arc<dyn LocationStore>, config: BatcherConfig) -> Self {
        Self {
            store,
            pending: Mutex::new(Vec::with_capacity(config.batch_size)),
            flush_gate: tokio::sync::Mutex::new(()),
            nudge: Notify::new(),
            draining: AtomicBool::new(false),
            config,
            metrics: Arc::new(BatcherMetrics::new()),
        }
    }

    /// Appends a sample to the pending batch.
    ///
    /// Returns `false` when the sample was dropped: either the buffer is at
    /// its bound or the batcher is draining for shutdown. Drops are counted
    /// and logged; the producer is never blocked or failed.
    pub fn enqueue(&self, sample: PositionSample) -> bool {
        if self.draining.load(Ordering::Acquire) {
            self.metrics.record_dropped(1);
            warn!(driver_id = %sample.driver_id, "sample dropped: batcher draining");
            return false;
        }

        let reached_threshold = {
            let mut pending = self.pending.lock();
            if pending.len() >= self.config.max_buffered {
                self.metrics.record_dropped(1);
                warn!(
                    driver_id = %sample.driver_id,
                    buffered = pending.len(),
                    "sample dropped: retention buffer full"
                );
                return false;
            }
            pending.push(sample);
            pending.len() >= self.config.batch_size
        };

        if reached_threshold {
            self.nudge.notify_one();
        }
        true
    }

    /// Swaps the pending batch out atomically and persists it.
    ///
    /// Mutually exclusive: a concurrent flush waits its turn and then sees
    /// only samples the first flush left behind. On failure the whole batch
    /// is prepended back in front of anything enqueued meanwhile, preserving
    /// order; truncation to the buffer bound drops the newest samples first.
    pub async fn flush(&self) -> Result<usize, StoreError> {
        let _gate = self.flush_gate.lock().await;

        let batch = {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                return Ok(0);
            }
            std::mem::take(&mut *pending)
        };
        let count = batch.len();

        let result = tokio::time::timeout(self.config.flush_timeout, self.store.save(&batch)).await;

        match result {
            Ok(Ok(())) => {
                self.metrics.record_flush(count);
                debug!(count, "location batch persisted");
                Ok(count)
            }
            Ok(Err(err)) => {
                self.restore(batch);
                self.metrics.record_failure();
                Err(err)
            }
            Err(_elapsed) => {
                self.restore(batch);
                self.metrics.record_failure();
                Err(StoreError::Timeout(self.config.flush_timeout))
            }
        }
    }

    /// Puts a failed batch back at the front of the buffer.
    fn restore(&self, mut batch: Vec<PositionSample>) {
        let mut pending = self.pending.lock();
        batch.append(&mut pending);

        let overflow = batch.len().saturating_sub(self.config.max_buffered);
        if overflow > 0 {
            batch.truncate(self.config.max_buffered);
            self.metrics.record_dropped(overflow);
            warn!(dropped = overflow, "retention buffer overflow after failed flush");
        }
        *pending = batch;
    }

    /// Samples currently awaiting persistence.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn metrics(&self) -> Arc<BatcherMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Spawns the flusher task: flushes on the timer, on size nudges, and
    /// once more on shutdown after intake stops.
    pub fn spawn_flusher(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let batcher = self;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(batcher.config.flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick is immediate; a flush of an empty batch is a no-op.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = batcher.nudge.notified() => {}
                    _ = shutdown.cancelled() => break,
                }

                if let Err(err) = batcher.flush().await {
                    warn!(error = %err, "batch flush failed; samples retained for retry");
                }
            }

            // Final drain: stop intake, then attempt one last flush.
            batcher.draining.store(true, Ordering::Release);
            match batcher.flush().await {
                Ok(count) if count > 0 => {
                    info!(count, "final batch flushed on shutdown");
                }
                Ok(_) => {}
                Err(err) => {
                    error!(
                        error = %err,
                        retained = batcher.pending_count(),
                        "final flush failed; samples lost at shutdown"
                    );
                }
            }
        })
    }
}
