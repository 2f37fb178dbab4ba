//! Integration tests for the voice negotiation endpoints.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use voxrelay_server::{app, config::Config, AppState};
use voxrelay_sfu::testing::MemoryTransport;
use voxrelay_types::api::{OfferResponse, StartSessionResponse};

fn setup() -> (Router, AppState, Arc<MemoryTransport>) {
    let transport = MemoryTransport::new();
    let state = AppState::new(&Config::default(), transport.clone());
    (app(state.clone()), state, transport)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn start(app: &Router) -> StartSessionResponse {
    let (status, body) = post_json(
        app,
        "/api/voice/start",
        json!({ "phone_number": "+15550100" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);
    serde_json::from_value(body).unwrap()
}

#[tokio::test]
async fn start_creates_room_with_caller_and_agent() {
    let (app, state, transport) = setup();

    let started = start(&app).await;
    assert_eq!(started.token, started.session_id);

    let room = state.registry.get_room(&started.room_id).expect("room exists");
    assert_eq!(room.participant_count(), 2);
    assert!(room.has_human());
    let caller = room.participant(&started.session_id).expect("caller");
    assert_eq!(caller.phone_number(), Some("+15550100"));
    assert_eq!(transport.session_count(), 2);
}

#[tokio::test]
async fn start_requires_phone_number() {
    let (app, state, _) = setup();

    let (status, body) = post_json(&app, "/api/voice/start", json!({ "phone_number": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "phone_number is required");

    let (status, _) = post_json(&app, "/api/voice/start", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(state.registry.room_count(), 0);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let (app, _, _) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/voice/offer")
                .header("Content-Type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_setup_leaves_no_room() {
    let (app, state, transport) = setup();
    transport.fail_sinks(true);

    let (status, body) = post_json(
        &app,
        "/api/voice/start",
        json!({ "phone_number": "+15550100" }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
    assert_eq!(state.registry.room_count(), 0);
}

#[tokio::test]
async fn offer_for_unknown_room_is_not_found() {
    let (app, _, _) = setup();

    let (status, body) = post_json(
        &app,
        "/api/voice/offer",
        json!({
            "room_id": "nope",
            "session_id": "nope",
            "offer": { "type": "offer", "sdp": "v=0\r\n" }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "room not found");
}

#[tokio::test]
async fn offer_for_unknown_participant_is_not_found() {
    let (app, _, _) = setup();
    let started = start(&app).await;

    let (status, body) = post_json(
        &app,
        "/api/voice/offer",
        json!({
            "room_id": started.room_id,
            "session_id": "someone-else",
            "offer": { "type": "offer", "sdp": "v=0\r\n" }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "participant not found");
}

#[tokio::test]
async fn offer_is_answered_with_complete_candidates() {
    let (app, state, transport) = setup();
    let started = start(&app).await;

    let (status, body) = post_json(
        &app,
        "/api/voice/offer",
        json!({
            "room_id": started.room_id,
            "session_id": started.session_id,
            "offer": { "type": "offer", "sdp": "v=0\r\no=- caller offer\r\n" }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {}", body);

    let response: OfferResponse = serde_json::from_value(body).unwrap();
    assert!(response.answer.sdp.contains("a=end-of-candidates"));

    let room = state.registry.get_room(&started.room_id).unwrap();
    let caller = room.participant(&started.session_id).unwrap();
    let session = transport.session(&caller.session().id()).unwrap();
    assert_eq!(
        session.remote_description().unwrap().sdp,
        "v=0\r\no=- caller offer\r\n"
    );
}

#[tokio::test]
async fn empty_offer_is_an_internal_error() {
    let (app, _, _) = setup();
    let started = start(&app).await;

    let (status, _) = post_json(
        &app,
        "/api/voice/offer",
        json!({
            "room_id": started.room_id,
            "session_id": started.session_id,
            "offer": { "type": "offer", "sdp": "" }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn ice_candidates_require_a_remote_description() {
    let (app, state, transport) = setup();
    let started = start(&app).await;
    let candidate = json!({
        "candidate": "candidate:1 1 udp 2130706431 192.0.2.1 50000 typ host",
        "sdpMid": "0",
        "sdpMLineIndex": 0
    });

    let (status, _) = post_json(
        &app,
        "/api/voice/ice-candidate",
        json!({
            "room_id": started.room_id,
            "session_id": started.session_id,
            "candidate": candidate
        }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, _) = post_json(
        &app,
        "/api/voice/offer",
        json!({
            "room_id": started.room_id,
            "session_id": started.session_id,
            "offer": { "type": "offer", "sdp": "v=0\r\n" }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_json(
        &app,
        "/api/voice/ice-candidate",
        json!({
            "room_id": started.room_id,
            "session_id": started.session_id,
            "candidate": candidate
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let room = state.registry.get_room(&started.room_id).unwrap();
    let caller = room.participant(&started.session_id).unwrap();
    let session = transport.session(&caller.session().id()).unwrap();
    let candidates = session.candidates();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].sdp_mid.as_deref(), Some("0"));
    assert_eq!(candidates[0].sdp_mline_index, Some(0));
}

#[tokio::test]
async fn answer_is_applied_to_the_session() {
    let (app, state, transport) = setup();
    let started = start(&app).await;

    let (status, body) = post_json(
        &app,
        "/api/voice/answer",
        json!({
            "room_id": started.room_id,
            "session_id": started.session_id,
            "answer": { "type": "answer", "sdp": "v=0\r\no=- caller answer\r\n" }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let room = state.registry.get_room(&started.room_id).unwrap();
    let caller = room.participant(&started.session_id).unwrap();
    let session = transport.session(&caller.session().id()).unwrap();
    assert_eq!(
        session.remote_description().unwrap().sdp,
        "v=0\r\no=- caller answer\r\n"
    );
}

#[tokio::test]
async fn health_reports_gauges() {
    let (app, _, _) = setup();
    start(&app).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "voice-agent");
    assert_eq!(json["rooms"], 1);
    assert_eq!(json["signaling_clients"], 0);
    assert_eq!(json["dropped_envelopes"], 0);
}

#[tokio::test]
async fn teardown_discards_buffered_audio() {
    let (app, state, _) = setup();
    let started = start(&app).await;

    assert!(state
        .stt_buffers
        .append(&started.session_id, &[0u8; 100])
        .await
        .is_none());
    assert_eq!(state.stt_buffers.buffered_len(&started.session_id).await, 100);

    assert!(state.teardown_room(&started.room_id).await);
    assert_eq!(state.stt_buffers.buffered_len(&started.session_id).await, 0);
    assert!(state.registry.get_room(&started.room_id).is_none());
    assert!(!state.teardown_room(&started.room_id).await);
}
