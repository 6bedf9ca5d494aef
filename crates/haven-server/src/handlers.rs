//! Connection handlers for the Haven server.
//!
//! This module owns the connection lifecycle: each WebSocket gets a
//! transport-assigned connection id and an outbox channel, inbound events
//! are dispatched under the signaling lock, and the resulting deliveries
//! are fanned out through the outboxes of the targeted connections.

use crate::config::Config;
use crate::history::ChatHistory;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use haven_core::{now_millis, Delivery, SignalingState};
use haven_protocol::{codec, ServerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Signaling registries behind a single lock; every dispatch step is
    /// short and never awaits while holding it.
    pub signaling: Mutex<SignalingState>,
    /// Outbox senders per live connection, for delivery fan-out.
    pub peers: DashMap<String, mpsc::UnboundedSender<ServerEvent>>,
    /// Chat message history for the HTTP API.
    pub history: ChatHistory,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            signaling: Mutex::new(SignalingState::new()),
            peers: DashMap::new(),
            history: ChatHistory::new(),
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    spawn_call_reaper(state.clone());

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route(
            "/api/chat/messages",
            get(get_messages).post(post_message),
        )
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Haven server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodic sweep removing calls stuck in initiating past the timeout.
/// Takes the same signaling lock as the foreground handlers.
fn spawn_call_reaper(state: Arc<AppState>) {
    let interval = Duration::from_millis(state.config.calls.reap_interval_ms);
    let timeout = Duration::from_millis(state.config.calls.initiate_timeout_ms);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let (reaped, calls) = {
                let mut signaling = state.signaling.lock().await;
                let reaped = signaling.reap_stale_calls(now_millis(), timeout);
                (reaped, signaling.stats().calls)
            };
            if reaped > 0 {
                debug!(reaped, "Reaped stale calls");
                metrics::record_reaped(reaped);
                metrics::set_active_calls(calls);
            }
        }
    });
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "messages": state.history.len().await
    }))
}

/// `GET /api/chat/messages` - full message history.
async fn get_messages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.history.all().await)
}

/// `POST /api/chat/messages` - append a message.
async fn post_message(
    State(state): State<Arc<AppState>>,
    Json(message): Json<serde_json::Value>,
) -> impl IntoResponse {
    let stored = state.history.append(message).await;
    (StatusCode::CREATED, Json(stored))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    // Generate connection ID
    let connection_id = format!(
        "conn_{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    );

    debug!(connection = %connection_id, "WebSocket connected");

    // Split the WebSocket
    let (mut sender, mut receiver) = socket.split();

    // Register this connection's outbox for delivery fan-out
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();
    state.peers.insert(connection_id.clone(), out_tx);

    // Message processing loop
    loop {
        tokio::select! {
            biased;

            // Deliveries routed to this connection
            Some(event) = out_rx.recv() => {
                match codec::encode(&event) {
                    Ok(text) => {
                        metrics::record_event("outbound");
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(connection = %connection_id, error = %e, "Failed to encode event");
                        metrics::record_error("encode");
                    }
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&state, &connection_id, text.as_bytes()).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        handle_inbound(&state, &connection_id, &data).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup: drop the outbox, then let the dispatcher tear down rooms
    // and calls and notify affected peers.
    state.peers.remove(&connection_id);
    {
        let mut signaling = state.signaling.lock().await;
        let deliveries = signaling.disconnect(&connection_id);
        let stats = signaling.stats();
        metrics::set_active_rooms(stats.rooms);
        metrics::set_active_calls(stats.calls);
        // Enqueued under the lock so outbox order matches mutation order.
        deliver(&state, deliveries);
    }

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Decode and dispatch one inbound frame. A malformed frame never tears
/// down the connection or affects other connections.
async fn handle_inbound(state: &Arc<AppState>, connection_id: &str, data: &[u8]) {
    if data.len() > state.config.limits.max_event_size {
        warn!(connection = %connection_id, size = data.len(), "Dropping oversized event");
        metrics::record_error("oversized");
        return;
    }

    let event = match codec::decode_slice(data) {
        Ok(event) => event,
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Dropping undecodable event");
            metrics::record_error("decode");
            return;
        }
    };

    metrics::record_event("inbound");

    let mut signaling = state.signaling.lock().await;
    let deliveries = signaling.dispatch(connection_id, event);
    let stats = signaling.stats();
    metrics::set_active_rooms(stats.rooms);
    metrics::set_active_calls(stats.calls);
    // Deliveries must be enqueued while the lock is still held: `deliver`
    // never blocks, and fanning out under the lock keeps each target's
    // outbox in mutation order. Releasing first would let a concurrent
    // dispatch enqueue a newer roster ahead of an older one.
    deliver(state, deliveries);
}

/// Fan deliveries out to each target's outbox. Targets without a live
/// outbox (already disconnected) are silently skipped.
fn deliver(state: &Arc<AppState>, deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        if let Some(peer) = state.peers.get(&delivery.target) {
            let _ = peer.send(delivery.event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Register an outbox for a connection and declare its identity.
    async fn attach(
        state: &Arc<AppState>,
        conn: &str,
        user: &str,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        state.peers.insert(conn.to_string(), tx);
        let frame = format!(
            r#"{{"event":"join-user","data":{{"userId":"{user}","displayName":"{user}"}}}}"#
        );
        handle_inbound(state, conn, frame.as_bytes()).await;
        rx
    }

    fn last_roster(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<String> {
        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            if let ServerEvent::OnlineUsers { users, .. } = event {
                last = Some(users.into_iter().map(|m| m.user_id).collect());
            }
        }
        last.expect("no online-users event received")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_roster_broadcasts_arrive_in_mutation_order() {
        let state = Arc::new(AppState::new(Config::default()));
        let mut rx_a = attach(&state, "conn-a", "alice").await;
        let _rx_b = attach(&state, "conn-b", "bob").await;

        handle_inbound(&state, "conn-a", br#"{"event":"join-chat","data":{"chatId":"r1"}}"#).await;

        // conn-b churns membership from several tasks at once. Each
        // mutation's broadcast is enqueued while the signaling lock is
        // still held, so conn-a's outbox sees rosters in mutation order
        // and the last one received equals the final state.
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                handle_inbound(
                    &state,
                    "conn-b",
                    br#"{"event":"join-chat","data":{"chatId":"r1"}}"#,
                )
                .await;
                handle_inbound(
                    &state,
                    "conn-b",
                    br#"{"event":"leave-chat","data":{"chatId":"r1"}}"#,
                )
                .await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // Every task ends with a leave, so conn-b is out of r1 and the
        // last roster conn-a holds must be [alice] alone.
        assert_eq!(last_roster(&mut rx_a), vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_disconnect_cleanup_notifies_remaining_members() {
        let state = Arc::new(AppState::new(Config::default()));
        let mut rx_a = attach(&state, "conn-a", "alice").await;
        let _rx_b = attach(&state, "conn-b", "bob").await;

        handle_inbound(&state, "conn-a", br#"{"event":"join-chat","data":{"chatId":"r1"}}"#).await;
        handle_inbound(&state, "conn-b", br#"{"event":"join-chat","data":{"chatId":"r1"}}"#).await;

        // Mirror the socket-close path: outbox gone, then teardown with
        // delivery under the same lock.
        state.peers.remove("conn-b");
        {
            let mut signaling = state.signaling.lock().await;
            let deliveries = signaling.disconnect("conn-b");
            deliver(&state, deliveries);
        }

        assert_eq!(last_roster(&mut rx_a), vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_health_reports_message_count() {
        let state = Arc::new(AppState::new(Config::default()));
        state
            .history
            .append(serde_json::json!({"id": "m1", "text": "hi"}))
            .await;

        let Json(body) = health_handler(State(state)).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["messages"], 1);
    }
}
