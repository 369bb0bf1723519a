//! FleetTrack real-time tracking pipeline
//!
//! The in-process core between the ingestion gateway and the external
//! collaborators: admission control, the latest-position cache, write-behind
//! persistence, active-delivery resolution, and per-order broadcast.
//!
//! # Architecture
//!
//! ```text
//!   driver clients                            customer clients
//!        │                                          ▲
//!        ▼                                          │ driver-location-update
//!  ┌───────────────┐   register/activity   ┌─────────────────┐
//!  │   Gateway     │──────────────────────▶│ BroadcastRouter │
//!  │ (ws + http)   │                       │  (router.rs)    │
//!  └──────┬────────┘                       └────────▲────────┘
//!         │ ingest(sample)                          │ publish(order, update)
//!         ▼                                         │
//!  ┌────────────────────────────────────────────────┴──┐
//!  │            TrackingPipeline (ingest.rs)           │
//!  │  validate → cache.put → batcher.enqueue →         │
//!  │  resolver.resolve → router.publish                │
//!  └───┬──────────────┬───────────────┬────────────────┘
//!      ▼              ▼               ▼
//!  ┌─────────┐  ┌────────────┐  ┌──────────────────┐
//!  │Position │  │ WriteBehind│  │ DeliveryResolver │
//!  │ Cache   │  │  Batcher   │  │  (resolver.rs)   │
//!  │(cache.rs)│ │(batcher.rs)│  └───────┬──────────┘
//!  └─────────┘  └─────┬──────┘          │ find_active_order
//!                     │ save(batch)     ▼
//!                     ▼            order service
//!              durable location store
//! ```
//!
//! Admission (`registry.rs`) bounds how many gateway connections feed the
//! pipeline; everything downstream of `ingest` is either synchronous and
//! allocation-light (cache, router) or explicitly decoupled behind a
//! background task (batcher flushes).

pub mod batcher;
pub mod cache;
pub mod ingest;
pub mod metrics;
pub mod registry;
pub mod resolver;
pub mod router;

pub use batcher::{BatcherConfig, WriteBehindBatcher};
pub use cache::PositionCache;
pub use ingest::TrackingPipeline;
pub use metrics::{BatcherMetrics, IngestMetrics, RouterMetrics};
pub use registry::ConnectionRegistry;
pub use resolver::{DeliveryResolver, ResolverConfig};
pub use router::{BroadcastRouter, OrderUpdate};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use chrono::Utc;
    use fleettrack_core::types::{
        ActiveDelivery, ConnectionMeta, DeliveryStatus, GeoPoint, PositionSample,
    };
    use fleettrack_store::{DeliverySource, LocationStore, MemoryDeliverySource, MemoryLocationStore};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn sample(driver: &str, lat: f64, lng: f64) -> PositionSample {
        PositionSample {
            driver_id: driver.to_string(),
            latitude: lat,
            longitude: lng,
            heading: Some(45.0),
            speed: Some(8.3),
            accuracy: Some(5.0),
            battery_level: Some(0.8),
            order_id: None,
            observed_at: Utc::now(),
        }
    }

    fn delivery(order: &str, driver: &str) -> ActiveDelivery {
        ActiveDelivery {
            order_id: order.to_string(),
            driver_id: driver.to_string(),
            pickup: GeoPoint {
                latitude: 40.75,
                longitude: -73.99,
            },
            destination: GeoPoint {
                latitude: 40.71,
                longitude: -74.0,
            },
            status: DeliveryStatus::EnRoute,
            started_at: Utc::now(),
            estimated_delivery_time: None,
            completed_at: None,
        }
    }

    fn pipeline(
        store: Arc<MemoryLocationStore>,
        source: Arc<MemoryDeliverySource>,
    ) -> TrackingPipeline {
        let cache = Arc::new(PositionCache::new(Duration::from_secs(60)));
        let batcher = Arc::new(WriteBehindBatcher::new(
            store as Arc<dyn LocationStore>,
            BatcherConfig::default(),
        ));
        let resolver = Arc::new(DeliveryResolver::new(
            source as Arc<dyn DeliverySource>,
            ResolverConfig::default(),
        ));
        let router = Arc::new(BroadcastRouter::new());
        TrackingPipeline::new(cache, batcher, resolver, router)
    }

    #[tokio::test]
    async fn test_sample_reaches_watching_customer() {
        let store = Arc::new(MemoryLocationStore::new());
        let source = Arc::new(MemoryDeliverySource::new());
        source.upsert(delivery("o1", "d1"));

        let pipeline = pipeline(store, source);

        // A customer watches order o1; another watches an unrelated order.
        let watcher = Uuid::new_v4();
        let (watcher_tx, mut watcher_rx) = mpsc::unbounded_channel();
        pipeline.router().attach(watcher, watcher_tx);
        pipeline.router().subscribe(watcher, "o1".to_string());

        let bystander = Uuid::new_v4();
        let (bystander_tx, mut bystander_rx) = mpsc::unbounded_channel();
        pipeline.router().attach(bystander, bystander_tx);
        pipeline.router().subscribe(bystander, "o2".to_string());

        // Driver d1 reports a position with no order id: the resolver finds
        // the active delivery and the watcher receives the update.
        let observed = sample("d1", 40.0, -73.0);
        let resolved = pipeline.ingest(observed.clone()).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("o1"));

        let pushed = watcher_rx.try_recv().unwrap();
        assert_eq!(pushed.order_id, "o1");
        assert_eq!(pushed.update.latitude, 40.0);
        assert_eq!(pushed.update.longitude, -73.0);
        assert_eq!(pushed.update.timestamp, observed.observed_at);
        assert!(bystander_rx.try_recv().is_err());

        // The cache answers immediately; the batcher holds the sample.
        assert_eq!(pipeline.cache().get("d1").unwrap().latitude, 40.0);
        assert_eq!(pipeline.batcher().pending_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_sample_touches_nothing() {
        let store = Arc::new(MemoryLocationStore::new());
        let source = Arc::new(MemoryDeliverySource::new());
        let pipeline = pipeline(Arc::clone(&store), source);

        let mut bad = sample("d1", 91.0, 0.0);
        bad.order_id = Some("o1".to_string());

        assert!(pipeline.ingest(bad).await.is_err());
        assert!(pipeline.cache().get("d1").is_none());
        assert_eq!(pipeline.batcher().pending_count(), 0);
        assert_eq!(pipeline.metrics().samples_rejected(), 1);
    }

    #[tokio::test]
    async fn test_ingested_samples_flush_to_store() {
        let store = Arc::new(MemoryLocationStore::new());
        let source = Arc::new(MemoryDeliverySource::new());
        let pipeline = pipeline(Arc::clone(&store), source);

        for n in 0..3 {
            pipeline
                .ingest(sample("d1", 40.0 + n as f64 * 0.001, -73.0))
                .await
                .unwrap();
        }
        pipeline.batcher().flush().await.unwrap();

        assert_eq!(store.sample_count(), 3);
    }

    #[tokio::test]
    async fn test_out_of_order_sample_not_broadcast() {
        let store = Arc::new(MemoryLocationStore::new());
        let source = Arc::new(MemoryDeliverySource::new());
        source.upsert(delivery("o1", "d1"));
        let pipeline = pipeline(Arc::clone(&store), source);

        let watcher = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        pipeline.router().attach(watcher, tx);
        pipeline.router().subscribe(watcher, "o1".to_string());

        let newer = sample("d1", 41.0, -73.0);
        let mut older = sample("d1", 40.0, -73.0);
        older.observed_at = newer.observed_at - chrono::TimeDelta::seconds(30);

        pipeline.ingest(newer).await.unwrap();
        assert!(rx.try_recv().is_ok());

        // The stale arrival is persisted for history but never pushed, and
        // the cache keeps the newer position.
        let resolved = pipeline.ingest(older).await.unwrap();
        assert!(resolved.is_none());
        assert!(rx.try_recv().is_err());
        assert_eq!(pipeline.cache().get("d1").unwrap().latitude, 41.0);
        assert_eq!(pipeline.batcher().pending_count(), 2);
    }

    #[tokio::test]
    async fn test_idle_driver_does_not_broadcast() {
        let store = Arc::new(MemoryLocationStore::new());
        let source = Arc::new(MemoryDeliverySource::new());
        let pipeline = pipeline(store, source);

        let watcher = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        pipeline.router().attach(watcher, tx);
        pipeline.router().subscribe(watcher, "o1".to_string());

        // No active delivery anywhere: nothing resolves, nothing is pushed.
        let resolved = pipeline.ingest(sample("idle", 40.0, -73.0)).await.unwrap();
        assert!(resolved.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_registry_bounds_concurrent_connections() {
        let registry = Arc::new(ConnectionRegistry::new(3));

        let mut accepted = Vec::new();
        for _ in 0..5 {
            let id = Uuid::new_v4();
            if registry.register(id, ConnectionMeta::default()).is_ok() {
                accepted.push(id);
            }
        }

        assert_eq!(accepted.len(), 3);
        assert_eq!(registry.len(), 3);

        registry.unregister(accepted[0]);
        assert!(registry
            .register(Uuid::new_v4(), ConnectionMeta::default())
            .is_ok());
    }
}
