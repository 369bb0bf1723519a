//! External collaborator interfaces for the tracking pipeline.
//!
//! The durable location store and the order service are consumed, never
//! re-specified: each is a narrow async trait with a REST implementation for
//! production and an in-memory implementation that doubles as the default
//! development backend and the test double. No other crate in the workspace
//! depends on a concrete storage technology.

pub mod geo;
pub mod memory;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleettrack_core::error::StoreError;
use fleettrack_core::types::{ActiveDelivery, NearbyDriver, PositionSample};

pub use memory::{MemoryDeliverySource, MemoryLocationStore};
pub use rest::{RestDeliverySource, RestLocationStore};

/// Bounds for a driver history read.
#[derive(Debug, Clone, Default)]
pub struct HistoryRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
}

/// A radius query against the geospatial index.
#[derive(Debug, Clone)]
pub struct RadiusQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    pub limit: usize,
}

/// Interface to the durable location store.
///
/// Persists historical samples and answers the geospatial queries the
/// gateway exposes. `save` is called by the write-behind batcher with whole
/// batches; everything else serves the read path.
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Persist a batch of samples. At-least-once: the batcher retries a
    /// failed batch, so implementations must tolerate duplicates.
    async fn save(&self, batch: &[PositionSample]) -> Result<(), StoreError>;

    /// The most recent persisted sample for a driver, if any.
    async fn latest(&self, driver_id: &str) -> Result<Option<PositionSample>, StoreError>;

    /// Historical samples for a driver, ordered by observation time ascending.
    async fn history(
        &self,
        driver_id: &str,
        range: &HistoryRange,
    ) -> Result<Vec<PositionSample>, StoreError>;

    /// Drivers whose last known position falls inside the radius, ordered by
    /// distance ascending.
    async fn query_nearby(&self, query: &RadiusQuery) -> Result<Vec<NearbyDriver>, StoreError>;
}

/// Interface to the order service's active-delivery view.
#[async_trait]
pub trait DeliverySource: Send + Sync {
    /// The in-progress delivery currently assigned to a driver, if any.
    async fn find_active_order(
        &self,
        driver_id: &str,
    ) -> Result<Option<ActiveDelivery>, StoreError>;

    /// A delivery by order id, regardless of status.
    async fn delivery(&self, order_id: &str) -> Result<Option<ActiveDelivery>, StoreError>;
}
