//! In-memory collaborator implementations.
//!
//! `MemoryLocationStore` and `MemoryDeliverySource` back the default
//! development configuration and serve as the test doubles across the
//! workspace. Both are safe for concurrent use.

use async_trait::async_trait;
use dashmap::DashMap;
use fleettrack_core::error::StoreError;
use fleettrack_core::types::{ActiveDelivery, GeoPoint, NearbyDriver, PositionSample};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::geo::haversine_meters;
use crate::{DeliverySource, HistoryRange, LocationStore, RadiusQuery};

/// Volatile location store keeping every persisted sample per driver.
#[derive(Debug, Default)]
pub struct MemoryLocationStore {
    rows: RwLock<HashMap<String, Vec<PositionSample>>>,
}

impl MemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of persisted samples, across all drivers.
    pub fn sample_count(&self) -> usize {
        self.rows.read().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl LocationStore for MemoryLocationStore {
    async fn save(&self, batch: &[PositionSample]) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        for sample in batch {
            rows.entry(sample.driver_id.clone())
                .or_default()
                .push(sample.clone());
        }
        Ok(())
    }

    async fn latest(&self, driver_id: &str) -> Result<Option<PositionSample>, StoreError> {
        let rows = self.rows.read();
        Ok(rows
            .get(driver_id)
            .and_then(|samples| samples.iter().max_by_key(|s| s.observed_at))
            .cloned())
    }

    async fn history(
        &self,
        driver_id: &str,
        range: &HistoryRange,
    ) -> Result<Vec<PositionSample>, StoreError> {
        let rows = self.rows.read();
        let mut samples: Vec<PositionSample> = rows
            .get(driver_id)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|s| range.start.is_none_or(|start| s.observed_at >= start))
                    .filter(|s| range.end.is_none_or(|end| s.observed_at <= end))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        samples.sort_by_key(|s| s.observed_at);
        if range.limit > 0 {
            samples.truncate(range.limit);
        }
        Ok(samples)
    }

    async fn query_nearby(&self, query: &RadiusQuery) -> Result<Vec<NearbyDriver>, StoreError> {
        let center = GeoPoint {
            latitude: query.latitude,
            longitude: query.longitude,
        };

        let rows = self.rows.read();
        let mut hits: Vec<NearbyDriver> = rows
            .values()
            .filter_map(|samples| samples.iter().max_by_key(|s| s.observed_at))
            .filter_map(|sample| {
                let distance = haversine_meters(center, sample.position());
                (distance <= query.radius_meters).then(|| NearbyDriver {
                    driver_id: sample.driver_id.clone(),
                    position: sample.position(),
                    distance_meters: distance,
                    observed_at: sample.observed_at,
                })
            })
            .collect();

        hits.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
        if query.limit > 0 {
            hits.truncate(query.limit);
        }
        Ok(hits)
    }
}

/// Volatile order-service view, keyed by order id.
#[derive(Debug, Default)]
pub struct MemoryDeliverySource {
    deliveries: DashMap<String, ActiveDelivery>,
}

impl MemoryDeliverySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a delivery.
    pub fn upsert(&self, delivery: ActiveDelivery) {
        self.deliveries.insert(delivery.order_id.clone(), delivery);
    }

    /// Move a delivery into a terminal state.
    pub fn set_status(&self, order_id: &str, status: fleettrack_core::types::DeliveryStatus) {
        if let Some(mut delivery) = self.deliveries.get_mut(order_id) {
            delivery.status = status;
            if status.is_terminal() {
                delivery.completed_at = Some(chrono::Utc::now());
            }
        }
    }
}

#[async_trait]
impl DeliverySource for MemoryDeliverySource {
    async fn find_active_order(
        &self,
        driver_id: &str,
    ) -> Result<Option<ActiveDelivery>, StoreError> {
        Ok(self
            .deliveries
            .iter()
            .find(|entry| entry.driver_id == driver_id && !entry.status.is_terminal())
            .map(|entry| entry.value().clone()))
    }

    async fn delivery(&self, order_id: &str) -> Result<Option<ActiveDelivery>, StoreError> {
        Ok(self.deliveries.get(order_id).map(|d| d.value().clone()))
    }
}
