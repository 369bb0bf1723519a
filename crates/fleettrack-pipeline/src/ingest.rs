//! Ingest pipeline
//!
//! One inbound sample is one message through a fixed sequence: validate,
//! refresh the latest-position cache, enqueue for write-behind persistence,
//! resolve the active order, and broadcast to that order's watchers. Both
//! the WebSocket path and the HTTP fallback run the same sequence.

use fleettrack_core::error::ValidationError;
use fleettrack_core::types::{OrderId, PositionSample};
use std::sync::Arc;
use tracing::debug;

use crate::batcher::WriteBehindBatcher;
use crate::cache::PositionCache;
use crate::metrics::IngestMetrics;
use crate::resolver::DeliveryResolver;
use crate::router::BroadcastRouter;

/// The shared ingestion path behind every gateway entry point.
pub struct TrackingPipeline {
    cache: Arc<PositionCache>,
    batcher: Arc<WriteBehindBatcher>,
    resolver: Arc<DeliveryResolver>,
    router: Arc<BroadcastRouter>,
    metrics: Arc<IngestMetrics>,
}

impl TrackingPipeline {
    pub fn new(
        cache: Arc<PositionCache>,
        batcher: Arc<WriteBehindBatcher>,
        resolver: Arc<DeliveryResolver>,
        router: Arc<BroadcastRouter>,
    ) -> Self {
        Self {
            cache,
            batcher,
            resolver,
            router,
            metrics: Arc::new(IngestMetrics::new()),
        }
    }

    /// Runs one sample through the pipeline.
    ///
    /// Returns the resolved order id, when the driver is on a delivery. A
    /// validation failure is the only error: the sample is rejected before
    /// it touches any component. Persistence and broadcast degradation stay
    /// internal; the producer only ever learns about malformed input.
    ///
    /// An out-of-order sample (observed before the driver's cached latest)
    /// is still persisted for history but never broadcast: watchers observe
    /// positions in non-decreasing observation order.
    pub async fn ingest(&self, sample: PositionSample) -> Result<Option<OrderId>, ValidationError> {
        if let Err(err) = sample.validate() {
            self.metrics.record_rejected();
            debug!(driver_id = %sample.driver_id, error = %err, "sample rejected");
            return Err(err);
        }
        self.metrics.record_received();

        let fresh = self.cache.put(sample.clone());
        self.batcher.enqueue(sample.clone());

        if !fresh {
            return Ok(None);
        }

        let resolved = self
            .resolver
            .resolve(&sample.driver_id, sample.order_id.as_ref())
            .await;

        if let Some(order_id) = &resolved {
            let reached = self.router.publish(order_id, sample.to_update());
            self.metrics.record_published();
            debug!(
                driver_id = %sample.driver_id,
                order_id = %order_id,
                subscribers = reached,
                "position update broadcast"
            );
        }

        Ok(resolved)
    }

    pub fn cache(&self) -> &Arc<PositionCache> {
        &self.cache
    }

    pub fn batcher(&self) -> &Arc<WriteBehindBatcher> {
        &self.batcher
    }

    pub fn resolver(&self) -> &Arc<DeliveryResolver> {
        &self.resolver
    }

    pub fn router(&self) -> &Arc<BroadcastRouter> {
        &self.router
    }

    pub fn metrics(&self) -> Arc<IngestMetrics> {
        Arc::clone(&self.metrics)
    }
}
