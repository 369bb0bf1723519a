//! Broadcast Router
//!
//! Maintains per-order subscriber groups and pushes position updates only to
//! connections actively watching that order. Delivery is best-effort,
//! at-most-once per subscriber: a dead channel is logged and skipped without
//! affecting the rest of the group or the publisher.

use dashmap::DashMap;
use fleettrack_core::types::{ConnectionId, OrderId, PositionUpdate};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::metrics::RouterMetrics;

/// One update addressed to the watchers of an order.
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub order_id: OrderId,
    pub update: PositionUpdate,
}

/// Fan-out of position updates to subscribed connections.
///
/// Updates for the same order are handed to each subscriber's channel in
/// `publish` call order; the channels are FIFO, so per-order ordering holds
/// end to end within this process.
pub struct BroadcastRouter {
    subscribers: DashMap<OrderId, HashSet<ConnectionId>>,
    senders: DashMap<ConnectionId, mpsc::UnboundedSender<OrderUpdate>>,
    metrics: Arc<RouterMetrics>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            senders: DashMap::new(),
            metrics: Arc::new(RouterMetrics::new()),
        }
    }

    /// Registers the outbound channel for a connection.
    pub fn attach(&self, connection_id: ConnectionId, sender: mpsc::UnboundedSender<OrderUpdate>) {
        self.senders.insert(connection_id, sender);
    }

    /// Removes a connection's outbound channel. Idempotent.
    pub fn detach(&self, connection_id: ConnectionId) {
        self.senders.remove(&connection_id);
    }

    /// Adds a connection to an order's subscriber group. Idempotent.
    pub fn subscribe(&self, connection_id: ConnectionId, order_id: OrderId) {
        self.subscribers
            .entry(order_id)
            .or_default()
            .insert(connection_id);
    }

    /// Removes a connection from every group it belongs to.
    pub fn unsubscribe_all(&self, connection_id: ConnectionId) {
        self.subscribers.retain(|_, group| {
            group.remove(&connection_id);
            !group.is_empty()
        });
    }

    /// Delivers an update to every current subscriber of the order.
    ///
    /// Fire-and-forget: returns how many subscribers the update reached.
    /// Individual failures never propagate to the publisher.
    pub fn publish(&self, order_id: &str, update: PositionUpdate) -> usize {
        let targets: Vec<ConnectionId> = match self.subscribers.get(order_id) {
            Some(group) => group.iter().copied().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for connection_id in targets {
            let Some(sender) = self.senders.get(&connection_id) else {
                debug!(
                    connection_id = %connection_id,
                    order_id = %order_id,
                    "subscriber has no live channel"
                );
                self.metrics.record_failure();
                continue;
            };

            let message = OrderUpdate {
                order_id: order_id.to_string(),
                update: update.clone(),
            };
            match sender.send(message) {
                Ok(()) => {
                    delivered += 1;
                    self.metrics.record_delivered();
                }
                Err(_) => {
                    debug!(
                        connection_id = %connection_id,
                        order_id = %order_id,
                        "subscriber channel closed"
                    );
                    self.metrics.record_failure();
                }
            }
        }

        delivered
    }

    /// Current subscriber count for an order.
    pub fn subscriber_count(&self, order_id: &str) -> usize {
        self.subscribers
            .get(order_id)
            .map(|group| group.len())
            .unwrap_or(0)
    }

    pub fn metrics(&self) -> Arc<RouterMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl Default for BroadcastRouter {
    fn default() -> Self {
        Self::new()
    }
}
