//! HTTP fallback and query surface for the tracking gateway.
//!
//! Mirrors the real-time path for clients that cannot hold a WebSocket open:
//! `POST /tracking/location` runs the same pipeline as a `location-update`
//! frame. Read endpoints consult the latest-position cache first and fall
//! back to the durable store.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use fleettrack_core::error::ValidationError;
use fleettrack_core::types::PositionSample;
use fleettrack_pipeline::{ConnectionRegistry, PositionCache, TrackingPipeline};
use fleettrack_store::{DeliverySource, HistoryRange, LocationStore, RadiusQuery};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::types::*;

// ============================================================================
// Application State
// ============================================================================

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<TrackingPipeline>,
    pub registry: Arc<ConnectionRegistry>,
    pub cache: Arc<PositionCache>,
    pub store: Arc<dyn LocationStore>,
    pub deliveries: Arc<dyn DeliverySource>,
    pub simulator_secret: Option<String>,
    pub start_time: Instant,
}

// ============================================================================
// Router Setup
// ============================================================================

pub fn create_rest_router(state: ApiState) -> Router {
    Router::new()
        .route("/tracking/location", post(submit_location))
        .route("/tracking/simulator/location", post(submit_simulator_locations))
        .route("/tracking/driver/{driver_id}/location", get(get_driver_location))
        .route("/tracking/driver/{driver_id}/history", get(get_driver_history))
        .route("/tracking/nearby", get(get_nearby_drivers))
        .route("/tracking/order/{order_id}", get(get_order_tracking))
        .route("/tracking/health", get(health_check))
        .route("/tracking/status", get(get_system_status))
        .with_state(state)
}

// ============================================================================
// Ingestion Endpoints
// ============================================================================

/// POST /tracking/location - HTTP fallback for a single position report
async fn submit_location(
    State(state): State<ApiState>,
    Json(request): Json<LocationUpdateRequest>,
) -> Result<Json<LocationAccepted>, ApiError> {
    request.validate()?;

    state.pipeline.ingest(request.into_sample()).await?;

    Ok(Json(LocationAccepted {
        success: true,
        id: Uuid::new_v4(),
    }))
}

/// POST /tracking/simulator/location - trusted simulator/test traffic
///
/// Gated by a shared secret header, never by an end-user session. Accepts a
/// single sample or an array; invalid samples are counted, not fatal.
async fn submit_simulator_locations(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(payload): Json<SimulatorPayload>,
) -> Result<Json<SimulatorAccepted>, ApiError> {
    let Some(expected) = state.simulator_secret.as_deref() else {
        return Err(ApiError::Unauthorized(
            "simulator endpoint is not enabled".to_string(),
        ));
    };
    let provided = headers
        .get("x-simulator-secret")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        warn!("simulator request with bad shared secret");
        return Err(ApiError::Unauthorized("invalid simulator secret".to_string()));
    }

    let requests = payload.into_vec();
    let mut accepted = 0;
    let mut rejected = 0;

    for request in requests {
        match state.pipeline.ingest(request.into_sample()).await {
            Ok(_) => accepted += 1,
            Err(_) => rejected += 1,
        }
    }

    if rejected > 0 {
        info!(accepted, rejected, "simulator batch partially rejected");
    }

    Ok(Json(SimulatorAccepted {
        success: rejected == 0,
        count: accepted,
        rejected,
    }))
}

/// Comparison that does not leak the matching prefix length.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ============================================================================
// Query Endpoints
// ============================================================================

/// GET /tracking/driver/{driver_id}/location - current position
async fn get_driver_location(
    State(state): State<ApiState>,
    Path(driver_id): Path<String>,
) -> Result<Json<PositionSample>, ApiError> {
    if let Some(sample) = state.cache.get(&driver_id) {
        return Ok(Json(sample));
    }

    let sample = state
        .store
        .latest(&driver_id)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("no known position for driver {driver_id}")))?;

    Ok(Json(sample))
}

/// GET /tracking/driver/{driver_id}/history - persisted samples, ascending
async fn get_driver_history(
    State(state): State<ApiState>,
    Path(driver_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<PositionSample>>, ApiError> {
    let range = HistoryRange {
        start: params.start,
        end: params.end,
        limit: params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
    };

    let samples = state
        .store
        .history(&driver_id, &range)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    Ok(Json(samples))
}

/// GET /tracking/nearby - drivers within a radius, distance ascending
async fn get_nearby_drivers(
    State(state): State<ApiState>,
    Query(params): Query<NearbyParams>,
) -> Result<Json<Vec<fleettrack_core::types::NearbyDriver>>, ApiError> {
    if !(-90.0..=90.0).contains(&params.lat) || !(-180.0..=180.0).contains(&params.lng) {
        return Err(ApiError::BadRequest("coordinates out of range".to_string()));
    }
    if params.radius <= 0.0 {
        return Err(ApiError::BadRequest("radius must be positive".to_string()));
    }

    let query = RadiusQuery {
        latitude: params.lat,
        longitude: params.lng,
        radius_meters: params.radius,
        limit: params.limit.unwrap_or(DEFAULT_NEARBY_LIMIT),
    };

    let drivers = state
        .store
        .query_nearby(&query)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    Ok(Json(drivers))
}

/// GET /tracking/order/{order_id} - combined delivery + position view
async fn get_order_tracking(
    State(state): State<ApiState>,
    Path(order_id): Path<String>,
) -> Result<Json<TrackingView>, ApiError> {
    let delivery = state
        .deliveries
        .delivery(&order_id)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?
        .filter(|d| !d.status.is_terminal())
        .ok_or_else(|| ApiError::NotFound(format!("no active delivery for order {order_id}")))?;

    // Cache first; a cold cache falls back to the durable store. A store
    // failure here degrades to "no position" rather than failing the view.
    let current_position = match state.cache.get(&delivery.driver_id) {
        Some(sample) => Some(sample),
        None => state
            .store
            .latest(&delivery.driver_id)
            .await
            .unwrap_or_else(|e| {
                warn!(order_id = %order_id, error = %e, "position fallback failed");
                None
            }),
    };

    Ok(Json(TrackingView {
        order_id: delivery.order_id,
        driver_id: delivery.driver_id,
        status: delivery.status,
        pickup: delivery.pickup,
        destination: delivery.destination,
        estimated_delivery_time: delivery.estimated_delivery_time,
        current_position,
    }))
}

// ============================================================================
// System Endpoints
// ============================================================================

/// GET /tracking/health - liveness probe (no auth required)
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now(),
    }))
}

/// GET /tracking/status - gateway traffic counters
async fn get_system_status(State(state): State<ApiState>) -> Json<SystemStatus> {
    let metrics = state.pipeline.metrics();

    Json(SystemStatus {
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_connections: state.registry.len(),
        samples_received: metrics.samples_received(),
        samples_rejected: metrics.samples_rejected(),
        updates_published: metrics.updates_published(),
        pending_samples: state.pipeline.batcher().pending_count(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Upstream(msg) => {
                error!(error = %msg, "collaborator request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream_error",
                    "a dependent service failed".to_string(),
                )
            }
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                format!("validation failed: {errors}"),
            ),
        };

        let body = Json(ErrorResponse::new(error_code, message));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
        assert!(!constant_time_eq(b"secres", b"secret"));
        assert!(constant_time_eq(b"", b""));
    }
}
