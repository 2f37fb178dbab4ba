//! voxrelay server library logic.
//!
//! Wires the room registry, media relay, signaling hub and voice providers
//! into one [`AppState`] and exposes them over HTTP and WebSocket.

pub mod api;
pub mod api_voice;
pub mod api_ws;
pub mod background;
pub mod config;
pub mod orchestrator;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use config::Config;
use orchestrator::SessionOrchestrator;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use voxrelay_sfu::{MediaRelay, MediaTransport, RelayConfig, RoomRegistry};
use voxrelay_voice::{AgentScript, SttBufferStore, SttService, TtsService};

/// Maximum request body size (2 MiB). Protects against OOM from oversized payloads.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Maximum audio chunk accepted by the STT endpoint (10 MiB).
const MAX_STT_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Active call rooms.
    pub registry: Arc<RoomRegistry>,
    /// Media session provisioning, forwarding and negotiation.
    pub relay: Arc<MediaRelay>,
    /// Connected signaling clients.
    pub hub: api_ws::SignalingHub,
    /// Session start and the agent's opening turn.
    pub orchestrator: Arc<SessionOrchestrator>,
    /// STT service.
    pub stt_service: Arc<SttService>,
    /// Caller audio awaiting transcription, per session.
    pub stt_buffers: Arc<SttBufferStore>,
    /// Language hint for transcription.
    pub language: String,
}

impl AppState {
    /// Builds the state from configuration, provisioning media through `transport`.
    pub fn new(config: &Config, transport: Arc<dyn MediaTransport>) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        let relay = Arc::new(MediaRelay::new(
            transport,
            RelayConfig {
                ice_servers: config.media.ice_servers(),
                negotiation_timeout: config.media.negotiation_timeout(),
            },
        ));
        let tts = Arc::new(TtsService::new(&config.voice));
        let orchestrator = Arc::new(SessionOrchestrator::new(
            registry.clone(),
            relay.clone(),
            tts,
            AgentScript::insurance(),
            config.voice.voice_id.clone(),
        ));

        Self {
            registry,
            relay,
            hub: api_ws::SignalingHub::new(config.sessions.signaling_queue_capacity),
            orchestrator,
            stt_service: Arc::new(SttService::new(&config.voice)),
            stt_buffers: Arc::new(SttBufferStore::new(
                config.sessions.stt_flush_threshold_bytes,
            )),
            language: config.voice.language.clone(),
        }
    }

    /// Removes a room, stops its tasks, closes its sessions and drops any
    /// audio its participants had buffered. Returns whether the room existed.
    pub async fn teardown_room(&self, room_id: &str) -> bool {
        let Some(room) = self.registry.get_room(room_id) else {
            return false;
        };
        for participant in room.participants() {
            self.stt_buffers.discard(participant.id()).await;
        }
        self.registry.teardown_room(room_id).await
    }

    /// Tears down every room (process shutdown).
    pub async fn shutdown(&self) {
        for room in self.registry.all_rooms() {
            self.teardown_room(room.id()).await;
        }
    }
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    // Audio chunks need a larger body limit than the JSON endpoints.
    let stt_routes = Router::new()
        .route("/api/voice/stt", post(api_voice::stt_handler))
        .layer(DefaultBodyLimit::max(MAX_STT_BODY_BYTES));

    Router::new()
        .route("/health", get(api::health_handler))
        .route("/api/voice/start", post(api_voice::start_session_handler))
        .route("/api/voice/ws", get(api_ws::ws_handler))
        .route("/api/voice/offer", post(api_voice::offer_handler))
        .route("/api/voice/answer", post(api_voice::answer_handler))
        .route(
            "/api/voice/ice-candidate",
            post(api_voice::ice_candidate_handler),
        )
        .merge(stt_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
