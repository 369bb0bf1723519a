//! Active-Delivery Resolver
//!
//! Maps a driver to the order they are currently delivering. Explicit order
//! ids on incoming samples are trusted; everything else goes through a
//! cached lookup against the order service with a bounded timeout. Lookup
//! failures fail open to "no active delivery" so a slow collaborator can
//! never block the ingestion hot path.

use dashmap::DashMap;
use fleettrack_store::DeliverySource;
use fleettrack_core::types::{DriverId, OrderId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Configuration for the delivery resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Lifetime of a cached driver/order association
    pub assignment_ttl: Duration,
    /// Lifetime of a cached "no active delivery" answer
    pub negative_ttl: Duration,
    /// Deadline for one lookup against the order service
    pub lookup_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            assignment_ttl: Duration::from_secs(60),
            negative_ttl: Duration::from_secs(15),
            lookup_timeout: Duration::from_millis(1500),
        }
    }
}

/// A cached association; `order: None` is a cached negative answer.
#[derive(Debug, Clone)]
struct CachedAssignment {
    order: Option<OrderId>,
    expires_at: Instant,
}

/// Resolves which order a driver is currently delivering.
pub struct DeliveryResolver {
    source: Arc<dyn DeliverySource>,
    assignments: DashMap<DriverId, CachedAssignment>,
    config: ResolverConfig,
}

impl DeliveryResolver {
    pub fn new(source: Arc<dyn DeliverySource>, config: ResolverConfig) -> Self {
        Self {
            source,
            assignments: DashMap::new(),
            config,
        }
    }

    /// Resolves the active order for a driver.
    ///
    /// An explicit order id from the sample wins outright and refreshes the
    /// cache. Otherwise the cached association answers within its TTL, and a
    /// miss queries the order service under `lookup_timeout`. Definitive
    /// answers (including "none") are cached; errors and timeouts are not,
    /// and resolve to `None` for this sample only.
    pub async fn resolve(&self, driver_id: &str, explicit: Option<&OrderId>) -> Option<OrderId> {
        if let Some(order_id) = explicit {
            self.remember(driver_id, Some(order_id.clone()), self.config.assignment_ttl);
            return Some(order_id.clone());
        }

        if let Some(cached) = self.assignments.get(driver_id) {
            if cached.expires_at > Instant::now() {
                return cached.order.clone();
            }
        }

        let lookup = tokio::time::timeout(
            self.config.lookup_timeout,
            self.source.find_active_order(driver_id),
        )
        .await;

        match lookup {
            Ok(Ok(Some(delivery))) if !delivery.status.is_terminal() => {
                debug!(
                    driver_id = %driver_id,
                    order_id = %delivery.order_id,
                    "active delivery resolved"
                );
                self.remember(
                    driver_id,
                    Some(delivery.order_id.clone()),
                    self.config.assignment_ttl,
                );
                Some(delivery.order_id)
            }
            Ok(Ok(_)) => {
                self.remember(driver_id, None, self.config.negative_ttl);
                None
            }
            Ok(Err(err)) => {
                warn!(driver_id = %driver_id, error = %err, "delivery lookup failed");
                None
            }
            Err(_elapsed) => {
                warn!(
                    driver_id = %driver_id,
                    timeout = ?self.config.lookup_timeout,
                    "delivery lookup timed out"
                );
                None
            }
        }
    }

    /// Drops the cached association for a driver.
    pub fn invalidate_driver(&self, driver_id: &str) {
        self.assignments.remove(driver_id);
    }

    /// Drops every cached association pointing at an order. Called when the
    /// order service reports the delivery completed or cancelled.
    pub fn invalidate_order(&self, order_id: &str) {
        self.assignments
            .retain(|_, cached| cached.order.as_deref() != Some(order_id));
    }

    /// Cached associations currently held, expired or not.
    pub fn cached_count(&self) -> usize {
        self.assignments.len()
    }

    fn remember(&self, driver_id: &str, order: Option<OrderId>, ttl: Duration) {
        self.assignments.insert(
            driver_id.to_string(),
            CachedAssignment {
                order,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}
