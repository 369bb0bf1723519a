//! Domain types for real-time courier position tracking.
//!
//! The wire representation of every type here is camelCase JSON, matching
//! what the mobile driver clients and the customer-facing tracking UI send
//! and receive.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Identifies a delivery driver. Issued by the identity service; opaque here.
pub type DriverId = String;

/// Identifies a customer order. Issued by the order service; opaque here.
pub type OrderId = String;

/// Identifies one live gateway connection.
pub type ConnectionId = Uuid;

/// A single position report from a driver client.
///
/// Samples are immutable once created. `observed_at` is the client-supplied
/// observation time and is the authority for recency: the pipeline keeps the
/// newest sample by `observed_at` regardless of arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub driver_id: DriverId,
    pub latitude: f64,
    pub longitude: f64,
    /// Compass heading in degrees, if the device reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Ground speed in meters per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Horizontal accuracy radius in meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Device battery level in [0, 1].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
    /// The order the driver claims to be delivering, when the client knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    pub observed_at: DateTime<Utc>,
}

impl PositionSample {
    /// Checks the domain invariants a sample must satisfy before it is
    /// allowed anywhere near the pipeline.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.driver_id.trim().is_empty() {
            return Err(ValidationError::EmptyDriverId);
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::LatitudeOutOfRange(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::LongitudeOutOfRange(self.longitude));
        }
        Ok(())
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// The broadcast payload derived from this sample.
    pub fn to_update(&self) -> PositionUpdate {
        PositionUpdate {
            latitude: self.latitude,
            longitude: self.longitude,
            heading: self.heading,
            timestamp: self.observed_at,
        }
    }
}

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// The position payload pushed to clients watching an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdate {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle states of a delivery, as reported by the order service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Assigned,
    PickedUp,
    EnRoute,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    /// Terminal states end the driver/order association.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }
}

/// A delivery in progress, owned by the order service and read here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveDelivery {
    pub order_id: OrderId,
    pub driver_id: DriverId,
    pub pickup: GeoPoint,
    pub destination: GeoPoint,
    pub status: DeliveryStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// One driver returned by a radius query against the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyDriver {
    pub driver_id: DriverId,
    pub position: GeoPoint,
    pub distance_meters: f64,
    pub observed_at: DateTime<Utc>,
}

/// Metadata captured when a connection is admitted.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMeta {
    /// Peer address as reported by the transport, when available.
    pub remote_addr: Option<String>,
    /// Free-form label for logs (e.g. the client's user agent).
    pub label: Option<String>,
}

/// Liveness record for one admitted connection.
///
/// Owned exclusively by the connection registry; `last_activity_at` is
/// refreshed on every inbound message and drives idle reaping.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub connection_id: ConnectionId,
    pub connected_at: Instant,
    pub last_activity_at: Instant,
    pub metadata: ConnectionMeta,
}

impl ConnectionRecord {
    pub fn new(connection_id: ConnectionId, metadata: ConnectionMeta) -> Self {
        let now = Instant::now();
        Self {
            connection_id,
            connected_at: now,
            last_activity_at: now,
            metadata,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Instant::now();
    }
}
