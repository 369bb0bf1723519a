//! Connection Registry
//!
//! Admits or refuses new real-time connections against a global ceiling and
//! tracks per-connection liveness for idle reaping. The accept decision is a
//! single atomic update, so concurrent registrations can never overshoot the
//! ceiling.

use dashmap::DashMap;
use fleettrack_core::error::RegistryError;
use fleettrack_core::types::{ConnectionId, ConnectionMeta, ConnectionRecord};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::metrics::set_connection_gauge;

/// Thread-safe registry of live gateway connections.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionRecord>,
    live: AtomicUsize,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            live: AtomicUsize::new(0),
            max_connections,
        }
    }

    /// Number of currently admitted connections.
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Admits a connection, or refuses it when the ceiling is reached.
    ///
    /// Refusal does not mutate the live count: a rejected registration is
    /// invisible to every later admission decision.
    pub fn register(
        &self,
        connection_id: ConnectionId,
        metadata: ConnectionMeta,
    ) -> Result<(), RegistryError> {
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < self.max_connections).then_some(live + 1)
            })
            .map_err(|live| RegistryError::CapacityExceeded {
                current: live,
                max: self.max_connections,
            })?;

        let record = ConnectionRecord::new(connection_id, metadata);
        if self.connections.insert(connection_id, record).is_some() {
            // The slot was already counted for the previous record.
            self.live.fetch_sub(1, Ordering::AcqRel);
            return Err(RegistryError::AlreadyRegistered(connection_id));
        }

        set_connection_gauge(self.len());
        info!(
            connection_id = %connection_id,
            live_connections = self.len(),
            "connection admitted"
        );
        Ok(())
    }

    /// Refreshes the liveness timestamp. No-op for unknown connections,
    /// which can happen when a message races its own disconnect.
    pub fn record_activity(&self, connection_id: ConnectionId) {
        if let Some(mut record) = self.connections.get_mut(&connection_id) {
            record.touch();
        }
    }

    /// Removes a connection. Idempotent.
    pub fn unregister(&self, connection_id: ConnectionId) {
        if self.connections.remove(&connection_id).is_some() {
            self.live.fetch_sub(1, Ordering::AcqRel);
            set_connection_gauge(self.len());
            debug!(
                connection_id = %connection_id,
                live_connections = self.len(),
                "connection removed"
            );
        }
    }

    /// Snapshot of connections whose last activity is older than `threshold`.
    ///
    /// The snapshot is independent of the registry, so a caller can walk it
    /// (or restart walking it) while connections keep churning.
    pub fn idle_connections(&self, threshold: Duration) -> Vec<ConnectionId> {
        let now = Instant::now();
        self.connections
            .iter()
            .filter(|entry| now.duration_since(entry.last_activity_at) > threshold)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Looks up a copy of a connection record.
    pub fn get(&self, connection_id: ConnectionId) -> Option<ConnectionRecord> {
        self.connections
            .get(&connection_id)
            .map(|r| r.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uuid::Uuid;

    #[test]
    fn test_register_and_unregister() {
        let registry = ConnectionRegistry::new(10);
        let id = Uuid::new_v4();

        registry.register(id, ConnectionMeta::default()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(id).is_some());

        registry.unregister(id);
        assert_eq!(registry.len(), 0);

        // Idempotent.
        registry.unregister(id);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_capacity_refusal_does_not_mutate_count() {
        let registry = ConnectionRegistry::new(2);
        let first = Uuid::new_v4();

        registry.register(first, ConnectionMeta::default()).unwrap();
        registry
            .register(Uuid::new_v4(), ConnectionMeta::default())
            .unwrap();

        let refused = registry.register(Uuid::new_v4(), ConnectionMeta::default());
        assert!(matches!(
            refused,
            Err(RegistryError::CapacityExceeded { current: 2, max: 2 })
        ));
        assert_eq!(registry.len(), 2);

        // A freed slot is admissible again.
        registry.unregister(first);
        assert!(registry
            .register(Uuid::new_v4(), ConnectionMeta::default())
            .is_ok());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = ConnectionRegistry::new(10);
        let id = Uuid::new_v4();

        registry.register(id, ConnectionMeta::default()).unwrap();
        let dup = registry.register(id, ConnectionMeta::default());
        assert!(matches!(dup, Err(RegistryError::AlreadyRegistered(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_idle_snapshot() {
        let registry = ConnectionRegistry::new(10);
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();

        registry.register(stale, ConnectionMeta::default()).unwrap();
        registry.register(fresh, ConnectionMeta::default()).unwrap();

        std::thread::sleep(Duration::from_millis(30));
        registry.record_activity(fresh);

        let idle = registry.idle_connections(Duration::from_millis(20));
        assert_eq!(idle, vec![stale]);
    }

    #[tokio::test]
    async fn test_ceiling_exact_under_concurrent_registration() {
        let registry = Arc::new(ConnectionRegistry::new(100));

        let mut handles = Vec::new();
        for _ in 0..150 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.register(Uuid::new_v4(), ConnectionMeta::default())
            }));
        }

        let mut accepted = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => accepted += 1,
                Err(RegistryError::CapacityExceeded { .. }) => refused += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(accepted, 100);
        assert_eq!(refused, 50);
        assert_eq!(registry.len(), 100);
    }
}
