//! Integration tests for the HTTP surface of the tracking gateway.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use fleettrack_api::rest::{create_rest_router, ApiState};
use fleettrack_core::types::{ActiveDelivery, DeliveryStatus, GeoPoint};
use fleettrack_pipeline::{
    BatcherConfig, BroadcastRouter, ConnectionRegistry, DeliveryResolver, PositionCache,
    ResolverConfig, TrackingPipeline, WriteBehindBatcher,
};
use fleettrack_store::{DeliverySource, LocationStore, MemoryDeliverySource, MemoryLocationStore};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

struct Harness {
    router: Router,
    store: Arc<MemoryLocationStore>,
    deliveries: Arc<MemoryDeliverySource>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryLocationStore::new());
    let deliveries = Arc::new(MemoryDeliverySource::new());

    let cache = Arc::new(PositionCache::new(Duration::from_secs(60)));
    let batcher = Arc::new(WriteBehindBatcher::new(
        Arc::clone(&store) as Arc<dyn LocationStore>,
        BatcherConfig::default(),
    ));
    let resolver = Arc::new(DeliveryResolver::new(
        Arc::clone(&deliveries) as Arc<dyn DeliverySource>,
        ResolverConfig::default(),
    ));
    let broadcast = Arc::new(BroadcastRouter::new());
    let pipeline = Arc::new(TrackingPipeline::new(
        Arc::clone(&cache),
        batcher,
        resolver,
        broadcast,
    ));

    let state = ApiState {
        pipeline,
        registry: Arc::new(ConnectionRegistry::new(100)),
        cache,
        store: Arc::clone(&store) as Arc<dyn LocationStore>,
        deliveries: Arc::clone(&deliveries) as Arc<dyn DeliverySource>,
        simulator_secret: Some("sim-secret".to_string()),
        start_time: Instant::now(),
    };

    Harness {
        router: create_rest_router(state),
        store,
        deliveries,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_probe() {
    let h = harness();
    let (status, body) = send(&h.router, get("/tracking/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_location_fallback_roundtrip() {
    let h = harness();

    let (status, body) = send(
        &h.router,
        post_json(
            "/tracking/location",
            json!({"driverId": "d1", "latitude": 40.7, "longitude": -73.9, "heading": 180.0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["id"].is_string());

    // Served from the cache without any flush having run.
    let (status, body) = send(&h.router, get("/tracking/driver/d1/location")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["latitude"], 40.7);
    assert_eq!(body["driverId"], "d1");
}

#[tokio::test]
async fn test_malformed_sample_rejected() {
    let h = harness();

    let (status, body) = send(
        &h.router,
        post_json(
            "/tracking/location",
            json!({"driverId": "d1", "latitude": 140.0, "longitude": 0.0}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    // Nothing was admitted anywhere.
    let (status, _) = send(&h.router, get("/tracking/driver/d1/location")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_driver_404() {
    let h = harness();
    let (status, body) = send(&h.router, get("/tracking/driver/ghost/location")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_location_falls_back_to_store() {
    let h = harness();

    // Persisted history but an empty cache, as after a process restart.
    h.store
        .save(&[fleettrack_core::types::PositionSample {
            driver_id: "d2".to_string(),
            latitude: 41.0,
            longitude: -72.0,
            heading: None,
            speed: None,
            accuracy: None,
            battery_level: None,
            order_id: None,
            observed_at: Utc::now(),
        }])
        .await
        .unwrap();

    let (status, body) = send(&h.router, get("/tracking/driver/d2/location")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["latitude"], 41.0);
}

#[tokio::test]
async fn test_simulator_requires_secret() {
    let h = harness();
    let payload = json!([
        {"driverId": "s1", "latitude": 40.0, "longitude": -73.0},
        {"driverId": "s2", "latitude": 40.1, "longitude": -73.1}
    ]);

    // Missing header.
    let (status, _) = send(
        &h.router,
        post_json("/tracking/simulator/location", payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Wrong header.
    let request = Request::builder()
        .method("POST")
        .uri("/tracking/simulator/location")
        .header("content-type", "application/json")
        .header("x-simulator-secret", "wrong")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, _) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Correct header: the batch is accepted.
    let request = Request::builder()
        .method("POST")
        .uri("/tracking/simulator/location")
        .header("content-type", "application/json")
        .header("x-simulator-secret", "sim-secret")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, body) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn test_simulator_counts_invalid_samples() {
    let h = harness();
    let payload = json!([
        {"driverId": "s1", "latitude": 40.0, "longitude": -73.0},
        {"driverId": "s2", "latitude": 99.0, "longitude": -73.1}
    ]);

    let request = Request::builder()
        .method("POST")
        .uri("/tracking/simulator/location")
        .header("content-type", "application/json")
        .header("x-simulator-secret", "sim-secret")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, body) = send(&h.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["count"], 1);
    assert_eq!(body["rejected"], 1);
}

#[tokio::test]
async fn test_nearby_sorted_by_distance() {
    let h = harness();

    // The nearby query reads the durable store, not the cache.
    let samples: Vec<fleettrack_core::types::PositionSample> = [("near", 40.7501), ("far", 40.7800)]
        .into_iter()
        .map(|(driver, lat)| fleettrack_core::types::PositionSample {
            driver_id: driver.to_string(),
            latitude: lat,
            longitude: -73.99,
            heading: None,
            speed: None,
            accuracy: None,
            battery_level: None,
            order_id: None,
            observed_at: Utc::now(),
        })
        .collect();
    h.store.save(&samples).await.unwrap();

    let (status, body) = send(
        &h.router,
        get("/tracking/nearby?lat=40.75&lng=-73.99&radius=10000&limit=5"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let hits = body.as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["driverId"], "near");
    assert_eq!(hits[1]["driverId"], "far");
}

#[tokio::test]
async fn test_nearby_validates_parameters() {
    let h = harness();

    let (status, _) = send(
        &h.router,
        get("/tracking/nearby?lat=200.0&lng=0.0&radius=100"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &h.router,
        get("/tracking/nearby?lat=40.0&lng=0.0&radius=-5"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_order_tracking_view() {
    let h = harness();

    let (status, _) = send(&h.router, get("/tracking/order/o1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.deliveries.upsert(ActiveDelivery {
        order_id: "o1".to_string(),
        driver_id: "d1".to_string(),
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
    });

    // No position yet: the view still renders.
    let (status, body) = send(&h.router, get("/tracking/order/o1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["driverId"], "d1");
    assert_eq!(body["status"], "en_route");
    assert!(body.get("currentPosition").is_none());

    // After a report, the view carries the live position.
    send(
        &h.router,
        post_json(
            "/tracking/location",
            json!({"driverId": "d1", "latitude": 40.72, "longitude": -73.98}),
        ),
    )
    .await;
    let (_, body) = send(&h.router, get("/tracking/order/o1")).await;
    assert_eq!(body["currentPosition"]["latitude"], 40.72);

    // A completed delivery no longer tracks.
    h.deliveries.set_status("o1", DeliveryStatus::Delivered);
    let (status, _) = send(&h.router, get("/tracking/order/o1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_history_endpoint() {
    let h = harness();

    let base = Utc::now();
    let samples: Vec<fleettrack_core::types::PositionSample> = (0..3)
        .map(|n| fleettrack_core::types::PositionSample {
            driver_id: "d1".to_string(),
            latitude: 40.0 + n as f64,
            longitude: -73.0,
            heading: None,
            speed: None,
            accuracy: None,
            battery_level: None,
            order_id: None,
            observed_at: base + chrono::TimeDelta::seconds(n),
        })
        .collect();
    h.store.save(&samples).await.unwrap();

    let (status, body) = send(&h.router, get("/tracking/driver/d1/history?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["latitude"], 40.0);
    assert_eq!(rows[1]["latitude"], 41.0);
}

#[tokio::test]
async fn test_status_reports_traffic() {
    let h = harness();

    send(
        &h.router,
        post_json(
            "/tracking/location",
            json!({"driverId": "d1", "latitude": 40.0, "longitude": -73.0}),
        ),
    )
    .await;

    let (status, body) = send(&h.router, get("/tracking/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["samplesReceived"], 1);
    assert_eq!(body["pendingSamples"], 1);
    assert_eq!(body["activeConnections"], 0);
}
