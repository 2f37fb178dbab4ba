//! Signaling relay: the WebSocket client directory and connection handler.

use crate::api::ApiError;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Extension, Query, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;
use voxrelay_types::Envelope;

/// How long a closing connection gets to flush its queue.
const FLUSH_GRACE: Duration = Duration::from_secs(1);

/// Type alias for the client map to satisfy clippy complexity checks.
type ClientMap = HashMap<String, (Uuid, mpsc::Sender<String>)>;

/// Directory of connected signaling clients.
///
/// Each client owns a bounded outbound queue. Enqueueing never waits: an
/// envelope for a full queue is dropped and counted.
#[derive(Clone)]
pub struct SignalingHub {
    /// Active clients: client_id -> (connection_id, sender).
    clients: Arc<RwLock<ClientMap>>,
    dropped: Arc<AtomicU64>,
    capacity: usize,
}

impl Default for SignalingHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SignalingHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
            dropped: Arc::new(AtomicU64::new(0)),
            capacity: capacity.max(1),
        }
    }

    /// Outbound queue length for new connections.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Registers a connection for `client_id` and returns its connection id.
    ///
    /// An existing connection under the same id is superseded: its sender is
    /// dropped, which ends its outbound task and closes it.
    pub async fn register(&self, client_id: String, sender: mpsc::Sender<String>) -> Uuid {
        let connection_id = Uuid::new_v4();
        let previous = self
            .clients
            .write()
            .await
            .insert(client_id.clone(), (connection_id, sender));
        if previous.is_some() {
            tracing::info!(
                client_id = %client_id,
                "replaced existing signaling connection"
            );
        }
        connection_id
    }

    /// Removes `client_id` if it is still bound to `connection_id`.
    ///
    /// Returns whether an entry was removed. A superseded connection's late
    /// removal is ignored.
    pub async fn unregister(&self, client_id: &str, connection_id: Uuid) -> bool {
        let mut clients = self.clients.write().await;
        match clients.get(client_id) {
            Some((current, _)) if *current == connection_id => {
                clients.remove(client_id);
                true
            }
            _ => false,
        }
    }

    pub async fn is_connected(&self, client_id: &str) -> bool {
        self.clients.read().await.contains_key(client_id)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Envelopes dropped on full queues since startup.
    pub fn dropped_envelopes(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn enqueue(&self, client_id: &str, sender: &mpsc::Sender<String>, message: String) -> bool {
        match sender.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    client_id = %client_id,
                    "dropping signaling envelope for slow consumer: {}",
                    e
                );
                false
            }
        }
    }

    /// Best-effort enqueue to one client. Returns whether it was queued;
    /// unknown clients are a no-op.
    pub async fn send_to_client(&self, client_id: &str, envelope: &Envelope) -> bool {
        let message = match serde_json::to_string(envelope) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!("failed to serialize signaling envelope: {}", e);
                return false;
            }
        };
        let clients = self.clients.read().await;
        match clients.get(client_id) {
            Some((_, sender)) => self.enqueue(client_id, sender, message),
            None => {
                tracing::debug!(client_id = %client_id, "signaling client not connected");
                false
            }
        }
    }

    /// Best-effort enqueue to every client except `exclude_id`. Returns the
    /// number of clients the envelope was queued for.
    pub async fn broadcast_to_room(&self, envelope: &Envelope, exclude_id: &str) -> usize {
        let message = match serde_json::to_string(envelope) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!("failed to serialize signaling envelope: {}", e);
                return 0;
            }
        };
        let clients = self.clients.read().await;
        let mut queued = 0;
        for (id, (_, sender)) in clients.iter() {
            if id != exclude_id && self.enqueue(id, sender, message.clone()) {
                queued += 1;
            }
        }
        queued
    }
}

/// Query parameters for the signaling connection.
#[derive(Debug, Deserialize)]
pub struct WsConnectParams {
    pub client_id: Option<String>,
}

/// `GET /api/voice/ws?client_id=...` — upgrades to a signaling connection.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
    Query(params): Query<WsConnectParams>,
) -> Response {
    let client_id = match params.client_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => {
            tracing::warn!("signaling connect missing client_id");
            return ApiError::BadRequest("client_id is required".to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, client_id))
}

/// Why the inbound loop of a connection stopped.
enum Exit {
    ClientClosed,
    OutboundClosed,
    DecodeFailed,
}

/// Handles one signaling connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, client_id: String) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<String>(state.hub.capacity());
    // The hub holds the only strong sender, so superseding or unregistering
    // this client closes the queue and ends the outbound task.
    let own_tx = tx.downgrade();
    let connection_id = state.hub.register(client_id.clone(), tx).await;
    tracing::info!(client_id = %client_id, %connection_id, "signaling client connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let exit = loop {
        tokio::select! {
            _ = &mut send_task => break Exit::OutboundClosed,
            msg = receiver.next() => {
                let decoded = match msg {
                    Some(Ok(Message::Text(text))) => serde_json::from_str::<Envelope>(text.as_str()),
                    Some(Ok(Message::Binary(data))) => serde_json::from_slice::<Envelope>(&data),
                    Some(Ok(Message::Close(_))) | None => break Exit::ClientClosed,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(client_id = %client_id, "signaling read error: {}", e);
                        break Exit::ClientClosed;
                    }
                };

                match decoded {
                    Ok(envelope) => handle_envelope(&state, &client_id, envelope),
                    Err(e) => {
                        tracing::warn!(client_id = %client_id, "invalid signaling envelope: {}", e);
                        if let Some(tx) = own_tx.upgrade() {
                            let error = Envelope::error(format!("invalid envelope: {}", e));
                            if let Ok(json) = serde_json::to_string(&error) {
                                let _ = tx.try_send(json);
                            }
                        }
                        break Exit::DecodeFailed;
                    }
                }
            }
        }
    };

    state.hub.unregister(&client_id, connection_id).await;

    if !matches!(exit, Exit::OutboundClosed)
        && tokio::time::timeout(FLUSH_GRACE, &mut send_task).await.is_err()
    {
        send_task.abort();
    }

    tracing::info!(
        client_id = %client_id,
        %connection_id,
        decode_failed = matches!(exit, Exit::DecodeFailed),
        "signaling client disconnected"
    );
}

/// Inbound envelopes are currently only observed: they are logged and keep
/// the referenced room alive.
fn handle_envelope(state: &AppState, client_id: &str, envelope: Envelope) {
    tracing::debug!(
        client_id = %client_id,
        kind = envelope.kind().as_str(),
        room_id = envelope.room_id().unwrap_or(""),
        "signaling envelope received"
    );

    if let Some(room_id) = envelope.room_id() {
        match state.registry.get_room(room_id) {
            Some(room) => room.touch(),
            None => {
                tracing::debug!(client_id = %client_id, room_id = %room_id, "envelope for unknown room");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let hub = SignalingHub::new(1);
        let (tx, _rx) = mpsc::channel(1);
        hub.register("a".to_string(), tx).await;

        let env = Envelope::error("x");
        assert!(hub.send_to_client("a", &env).await);
        assert!(!hub.send_to_client("a", &env).await);
        assert_eq!(hub.dropped_envelopes(), 1);
    }

    #[tokio::test]
    async fn unknown_client_is_a_noop() {
        let hub = SignalingHub::default();
        let env = Envelope::error("x");
        assert!(!hub.send_to_client("ghost", &env).await);
        assert_eq!(hub.dropped_envelopes(), 0);
    }

    #[tokio::test]
    async fn stale_unregister_is_ignored() {
        let hub = SignalingHub::default();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);

        let first = hub.register("a".to_string(), tx1).await;
        let second = hub.register("a".to_string(), tx2).await;

        // The superseded connection's queue is closed.
        assert!(rx1.recv().await.is_none());

        assert!(!hub.unregister("a", first).await);
        assert!(hub.is_connected("a").await);
        assert!(hub.unregister("a", second).await);
        assert!(!hub.is_connected("a").await);
    }

    #[tokio::test]
    async fn broadcast_skips_excluded_client() {
        let hub = SignalingHub::default();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        hub.register("a".to_string(), tx_a).await;
        hub.register("b".to_string(), tx_b).await;

        let env = Envelope::Error {
            room_id: Some("room-1".to_string()),
            error: "x".to_string(),
        };
        assert_eq!(hub.broadcast_to_room(&env, "a").await, 1);

        assert!(rx_a.try_recv().is_err());
        let got: Envelope = serde_json::from_str(&rx_b.recv().await.unwrap()).unwrap();
        assert_eq!(got, env);
    }
}
