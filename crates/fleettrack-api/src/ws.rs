//! WebSocket endpoint for real-time position ingestion and order tracking.
//!
//! One connection walks Connecting → Admitted → Active → Closed. Admission
//! happens before any message is processed; a refused connection gets a
//! capacity error frame and an immediate close. Active connections send
//! `location-update` and `subscribe-to-tracking` frames and receive acks
//! plus `driver-location-update` pushes for orders they watch.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use dashmap::DashMap;
use fleettrack_core::types::{ConnectionId, ConnectionMeta};
use fleettrack_pipeline::{BroadcastRouter, ConnectionRegistry, OrderUpdate, TrackingPipeline};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::types::{WsClientMessage, WsServerMessage};

// ============================================================================
// WebSocket State
// ============================================================================

#[derive(Clone)]
pub struct WsState {
    pub registry: Arc<ConnectionRegistry>,
    pub pipeline: Arc<TrackingPipeline>,
    pub router: Arc<BroadcastRouter>,
    /// Cancellation handles for live sessions; the idle reaper fires these.
    pub sessions: Arc<DashMap<ConnectionId, CancellationToken>>,
}

impl WsState {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        pipeline: Arc<TrackingPipeline>,
        router: Arc<BroadcastRouter>,
    ) -> Self {
        Self {
            registry,
            pipeline,
            router,
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Requests shutdown of a live session. Used by the idle reaper.
    pub fn close_session(&self, connection_id: ConnectionId) {
        if let Some(token) = self.sessions.get(&connection_id) {
            token.cancel();
        }
    }
}

// ============================================================================
// Router Setup
// ============================================================================

pub fn create_ws_router(state: WsState) -> Router {
    Router::new()
        .route("/tracking/ws", get(ws_upgrade_handler))
        .with_state(state)
}

/// WS /tracking/ws - the real-time tracking channel
async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// ============================================================================
// Connection Lifecycle
// ============================================================================

async fn handle_socket(mut socket: WebSocket, state: WsState) {
    let connection_id = Uuid::new_v4();

    // Connecting → Admitted, or refused and closed on the spot.
    if let Err(err) = state
        .registry
        .register(connection_id, ConnectionMeta::default())
    {
        warn!(connection_id = %connection_id, error = %err, "connection refused");
        let refusal = WsServerMessage::error("capacity_exceeded", err.to_string());
        if let Ok(json) = serde_json::to_string(&refusal) {
            let _ = socket.send(Message::Text(json.into())).await;
        }
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    info!(connection_id = %connection_id, "tracking connection opened");

    let (sender, receiver) = socket.split();

    // Outbound frames funnel through one channel; order pushes get their own
    // channel so the broadcast router never learns about frame types.
    let (client_tx, client_rx) = mpsc::unbounded_channel::<WsServerMessage>();
    let (order_tx, mut order_rx) = mpsc::unbounded_channel::<OrderUpdate>();
    state.router.attach(connection_id, order_tx);

    let token = CancellationToken::new();
    state.sessions.insert(connection_id, token.clone());

    let forward_tx = client_tx.clone();
    let forward_task = tokio::spawn(async move {
        while let Some(order_update) = order_rx.recv().await {
            if forward_tx
                .send(WsServerMessage::DriverLocationUpdate(order_update.update))
                .is_err()
            {
                break;
            }
        }
    });

    let mut send_task = tokio::spawn(send_frames(sender, client_rx, connection_id));
    let mut recv_task = tokio::spawn(receive_frames(
        receiver,
        client_tx,
        state.clone(),
        connection_id,
    ));

    tokio::select! {
        _ = &mut send_task => {
            debug!(connection_id = %connection_id, "send task completed");
        }
        _ = &mut recv_task => {
            debug!(connection_id = %connection_id, "receive task completed");
        }
        _ = token.cancelled() => {
            info!(connection_id = %connection_id, "session cancelled (idle reap or shutdown)");
        }
    }

    send_task.abort();
    recv_task.abort();
    forward_task.abort();

    // Active → Closed: tear down everything this connection owned.
    state.sessions.remove(&connection_id);
    state.router.unsubscribe_all(connection_id);
    state.router.detach(connection_id);
    state.registry.unregister(connection_id);

    info!(connection_id = %connection_id, "tracking connection closed");
}

// ============================================================================
// Frame Handling
// ============================================================================

async fn send_frames(
    mut sender: SplitSink<WebSocket, Message>,
    mut client_rx: mpsc::UnboundedReceiver<WsServerMessage>,
    connection_id: ConnectionId,
) {
    while let Some(message) = client_rx.recv().await {
        match serde_json::to_string(&message) {
            Ok(json) => {
                if let Err(e) = sender.send(Message::Text(json.into())).await {
                    debug!(connection_id = %connection_id, error = %e, "failed to send frame");
                    break;
                }
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "failed to serialize frame");
            }
        }
    }
}

async fn receive_frames(
    mut receiver: SplitStream<WebSocket>,
    client_tx: mpsc::UnboundedSender<WsServerMessage>,
    state: WsState,
    connection_id: ConnectionId,
) {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<WsClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(client_msg, &client_tx, &state, connection_id).await;
                }
                Err(e) => {
                    warn!(connection_id = %connection_id, error = %e, "unparseable frame");
                    let _ = client_tx.send(WsServerMessage::error(
                        "parse_error",
                        format!("failed to parse message: {e}"),
                    ));
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %connection_id, "binary frames are not supported");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                state.registry.record_activity(connection_id);
            }
            Ok(Message::Close(reason)) => {
                debug!(connection_id = %connection_id, reason = ?reason, "client closed connection");
                break;
            }
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "websocket error");
                break;
            }
        }
    }
}

async fn handle_client_message(
    message: WsClientMessage,
    client_tx: &mpsc::UnboundedSender<WsServerMessage>,
    state: &WsState,
    connection_id: ConnectionId,
) {
    state.registry.record_activity(connection_id);

    match message {
        WsClientMessage::LocationUpdate(request) => {
            let ack = match state.pipeline.ingest(request.into_sample()).await {
                Ok(_) => WsServerMessage::ack_received(),
                Err(err) => WsServerMessage::ack_error(err.to_string()),
            };
            let _ = client_tx.send(ack);
        }
        WsClientMessage::SubscribeToTracking { order_id } => {
            state.router.subscribe(connection_id, order_id.clone());
            debug!(
                connection_id = %connection_id,
                order_id = %order_id,
                "subscribed to order tracking"
            );
            let _ = client_tx.send(WsServerMessage::subscribed(order_id));
        }
    }
}
