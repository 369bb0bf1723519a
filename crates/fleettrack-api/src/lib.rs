//! FleetTrack ingestion gateway
//!
//! The boundary of the tracking service: a WebSocket channel for driver and
//! customer clients plus an HTTP fallback/query surface, both feeding the
//! shared tracking pipeline. The gateway owns the background tasks (batch
//! flusher, cache sweeper, idle reaper) and drives graceful shutdown with a
//! final flush.

pub mod rest;
pub mod types;
pub mod ws;

use anyhow::Context;
use fleettrack_pipeline::{ConnectionRegistry, PositionCache, TrackingPipeline, WriteBehindBatcher};
use fleettrack_store::{DeliverySource, LocationStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

pub use rest::{create_rest_router, ApiState};
pub use ws::{create_ws_router, WsState};

// ============================================================================
// Gateway Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,

    /// Enable permissive CORS (customer web clients)
    pub cors: bool,

    /// Connections idle longer than this are disconnected
    pub idle_timeout: Duration,

    /// Interval between idle sweeps
    pub idle_reap_interval: Duration,

    /// Interval between position-cache expiry sweeps
    pub cache_sweep_interval: Duration,

    /// Shared secret for the simulator ingestion endpoint
    pub simulator_secret: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 8080).into(),
            cors: true,
            idle_timeout: Duration::from_secs(300),
            idle_reap_interval: Duration::from_secs(60),
            cache_sweep_interval: Duration::from_secs(60),
            simulator_secret: None,
        }
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// The assembled tracking gateway.
pub struct Gateway {
    config: GatewayConfig,
    api_state: ApiState,
    ws_state: WsState,
    batcher: Arc<WriteBehindBatcher>,
    cache: Arc<PositionCache>,
    registry: Arc<ConnectionRegistry>,
    shutdown: CancellationToken,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        pipeline: Arc<TrackingPipeline>,
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn LocationStore>,
        deliveries: Arc<dyn DeliverySource>,
    ) -> Self {
        let cache = Arc::clone(pipeline.cache());
        let batcher = Arc::clone(pipeline.batcher());
        let router = Arc::clone(pipeline.router());

        let api_state = ApiState {
            pipeline: Arc::clone(&pipeline),
            registry: Arc::clone(&registry),
            cache: Arc::clone(&cache),
            store,
            deliveries,
            simulator_secret: config.simulator_secret.clone(),
            start_time: Instant::now(),
        };
        let ws_state = WsState::new(Arc::clone(&registry), pipeline, router);

        Self {
            config,
            api_state,
            ws_state,
            batcher,
            cache,
            registry,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the gateway when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Builds the full axum router: REST surface merged with the WS channel.
    pub fn router(&self) -> axum::Router {
        let mut router = create_rest_router(self.api_state.clone())
            .merge(create_ws_router(self.ws_state.clone()))
            .layer(TraceLayer::new_for_http());

        if self.config.cors {
            router = router.layer(CorsLayer::permissive());
        }
        router
    }

    /// Serves until the shutdown token fires, then drains background work.
    pub async fn run(self) -> anyhow::Result<()> {
        let flusher = Arc::clone(&self.batcher).spawn_flusher(self.shutdown.child_token());
        let sweeper = Arc::clone(&self.cache).spawn_sweeper(self.config.cache_sweep_interval);
        let reaper = spawn_idle_reaper(
            Arc::clone(&self.registry),
            self.ws_state.clone(),
            self.config.idle_timeout,
            self.config.idle_reap_interval,
            self.shutdown.child_token(),
        );

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.config.bind_addr))?;
        info!(bind_addr = %self.config.bind_addr, "tracking gateway listening");

        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("gateway server error")?;

        info!("gateway stopped accepting traffic; draining background tasks");

        // The flusher performs the final flush on its way out.
        self.shutdown.cancel();
        flusher.await.ok();
        reaper.abort();
        sweeper.abort();

        info!("gateway shutdown complete");
        Ok(())
    }
}

// ============================================================================
// Idle Reaping
// ============================================================================

/// Periodically disconnects connections that have gone quiet.
fn spawn_idle_reaper(
    registry: Arc<ConnectionRegistry>,
    ws_state: WsState,
    idle_timeout: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => break,
            }

            let idle = registry.idle_connections(idle_timeout);
            if idle.is_empty() {
                continue;
            }

            warn!(count = idle.len(), "reaping idle connections");
            for connection_id in idle {
                ws_state.close_session(connection_id);
            }
        }
    })
}
