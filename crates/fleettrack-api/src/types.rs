//! Gateway request, response, and WebSocket message types.

use chrono::{DateTime, Utc};
use fleettrack_core::types::{GeoPoint, OrderId, PositionSample, PositionUpdate};
use serde::{Deserialize, Serialize};
use validator::Validate;

// ============================================================================
// Ingestion payloads
// ============================================================================

/// A position report as sent by driver clients, over either transport.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdateRequest {
    #[validate(length(min = 1, message = "driverId must not be empty"))]
    pub driver_id: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,

    #[serde(default)]
    pub heading: Option<f64>,

    #[serde(default)]
    pub speed: Option<f64>,

    #[serde(default)]
    pub accuracy: Option<f64>,

    #[serde(default)]
    pub battery_level: Option<f64>,

    #[serde(default)]
    pub order_id: Option<String>,

    /// Client-side observation time; the server clock fills in when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LocationUpdateRequest {
    pub fn into_sample(self) -> PositionSample {
        PositionSample {
            driver_id: self.driver_id,
            latitude: self.latitude,
            longitude: self.longitude,
            heading: self.heading,
            speed: self.speed,
            accuracy: self.accuracy,
            battery_level: self.battery_level,
            order_id: self.order_id,
            observed_at: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

/// Simulator traffic: one sample or a burst of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SimulatorPayload {
    Single(Box<LocationUpdateRequest>),
    Batch(Vec<LocationUpdateRequest>),
}

impl SimulatorPayload {
    pub fn into_vec(self) -> Vec<LocationUpdateRequest> {
        match self {
            SimulatorPayload::Single(one) => vec![*one],
            SimulatorPayload::Batch(many) => many,
        }
    }
}

// ============================================================================
// HTTP responses
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationAccepted {
    pub success: bool,
    /// Server-assigned id for the accepted report.
    pub id: uuid::Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorAccepted {
    pub success: bool,
    /// Samples accepted into the pipeline.
    pub count: usize,
    /// Samples rejected by validation.
    #[serde(skip_serializing_if = "is_zero")]
    pub rejected: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Combined delivery + current-position view for one order.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingView {
    pub order_id: OrderId,
    pub driver_id: String,
    pub status: fleettrack_core::types::DeliveryStatus,
    pub pickup: GeoPoint,
    pub destination: GeoPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    /// Last known driver position, when one is fresh enough to report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_position: Option<PositionSample>,
}

/// Gateway liveness and traffic counters.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub uptime_seconds: u64,
    pub active_connections: usize,
    pub samples_received: u64,
    pub samples_rejected: u64,
    pub updates_published: u64,
    pub pending_samples: usize,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

pub const DEFAULT_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct NearbyParams {
    pub lat: f64,
    pub lng: f64,
    /// Radius in meters.
    pub radius: f64,
    pub limit: Option<usize>,
}

pub const DEFAULT_NEARBY_LIMIT: usize = 20;

// ============================================================================
// WebSocket messages, namespace `tracking`
// ============================================================================

/// Client → server frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WsClientMessage {
    LocationUpdate(LocationUpdateRequest),
    #[serde(rename_all = "camelCase")]
    SubscribeToTracking { order_id: OrderId },
}

/// Server → client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WsServerMessage {
    #[serde(rename_all = "camelCase")]
    LocationUpdateAck {
        timestamp: DateTime<Utc>,
        status: AckStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SubscriptionAck {
        timestamp: DateTime<Utc>,
        order_id: OrderId,
        status: SubscriptionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    DriverLocationUpdate(PositionUpdate),
    Error { code: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Received,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Subscribed,
    Error,
}

impl WsServerMessage {
    pub fn ack_received() -> Self {
        WsServerMessage::LocationUpdateAck {
            timestamp: Utc::now(),
            status: AckStatus::Received,
            message: None,
        }
    }

    pub fn ack_error(message: impl Into<String>) -> Self {
        WsServerMessage::LocationUpdateAck {
            timestamp: Utc::now(),
            status: AckStatus::Error,
            message: Some(message.into()),
        }
    }

    pub fn subscribed(order_id: OrderId) -> Self {
        WsServerMessage::SubscriptionAck {
            timestamp: Utc::now(),
            order_id,
            status: SubscriptionStatus::Subscribed,
            message: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        WsServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}
