//! Integration tests for the signaling WebSocket.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, tungstenite::Error};
use voxrelay_server::{app, config::Config, AppState};
use voxrelay_sfu::testing::MemoryTransport;
use voxrelay_types::{Envelope, SessionDescription};

async fn setup_test_server() -> (SocketAddr, AppState) {
    let state = AppState::new(&Config::default(), MemoryTransport::new());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, state)
}

/// Polls `check` until it holds or two seconds pass.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn queued_envelopes_reach_the_client() {
    let (addr, state) = setup_test_server().await;
    let url = format!("ws://{}/api/voice/ws?client_id=alice", addr);
    let (mut ws, _) = connect_async(url).await.expect("failed to connect");

    assert!(eventually(|| state.hub.is_connected("alice")).await);

    let envelope = Envelope::Offer {
        room_id: Some("room-1".to_string()),
        sdp: SessionDescription::offer("v=0\r\n"),
    };
    assert!(state.hub.send_to_client("alice", &envelope).await);

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out")
        .unwrap()
        .unwrap();
    let Message::Text(text) = msg else {
        panic!("expected text frame, got {:?}", msg);
    };
    let received: Envelope = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(received, envelope);
}

#[tokio::test]
async fn malformed_envelope_gets_error_then_close() {
    let (addr, state) = setup_test_server().await;
    let url = format!("ws://{}/api/voice/ws?client_id=bob", addr);
    let (mut ws, _) = connect_async(url).await.expect("failed to connect");
    assert!(eventually(|| state.hub.is_connected("bob")).await);

    ws.send(Message::Text(r#"{"type":"offer"}"#.into()))
        .await
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out")
        .unwrap()
        .unwrap();
    let Message::Text(text) = msg else {
        panic!("expected error frame, got {:?}", msg);
    };
    let json: Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(json["type"], "error");
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid envelope"));

    // The connection is closed after the error.
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .expect("connection was not closed");
    assert!(closed);

    assert!(eventually(|| {
        let hub = state.hub.clone();
        async move { !hub.is_connected("bob").await }
    })
    .await);
    assert!(!state.hub.send_to_client("bob", &Envelope::error("late")).await);
}

#[tokio::test]
async fn valid_envelope_keeps_the_connection_open() {
    let (addr, state) = setup_test_server().await;
    let url = format!("ws://{}/api/voice/ws?client_id=carol", addr);
    let (mut ws, _) = connect_async(url).await.expect("failed to connect");
    assert!(eventually(|| state.hub.is_connected("carol")).await);

    let envelope = Envelope::Answer {
        room_id: Some("unknown-room".to_string()),
        sdp: SessionDescription::answer("v=0\r\n"),
    };
    ws.send(Message::Text(serde_json::to_string(&envelope).unwrap().into()))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(state.hub.is_connected("carol").await);
    assert!(state.hub.send_to_client("carol", &Envelope::error("ping")).await);
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out")
        .unwrap()
        .unwrap();
    assert!(matches!(msg, Message::Text(_)));
}

#[tokio::test]
async fn missing_client_id_is_rejected() {
    let (addr, state) = setup_test_server().await;

    for url in [
        format!("ws://{}/api/voice/ws", addr),
        format!("ws://{}/api/voice/ws?client_id=", addr),
    ] {
        match connect_async(url).await {
            Err(Error::Http(response)) => assert_eq!(response.status(), 400),
            other => panic!("expected HTTP 400, got {:?}", other.map(|_| ())),
        }
    }
    assert_eq!(state.hub.client_count().await, 0);
}

#[tokio::test]
async fn reconnect_supersedes_previous_connection() {
    let (addr, state) = setup_test_server().await;
    let url = format!("ws://{}/api/voice/ws?client_id=dave", addr);

    let (mut first, _) = connect_async(url.clone()).await.expect("failed to connect");
    assert!(eventually(|| state.hub.is_connected("dave")).await);

    let (mut second, _) = connect_async(url).await.expect("failed to reconnect");

    // The first connection is closed by the server.
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match first.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .expect("superseded connection was not closed");
    assert!(closed);

    // The stale connection's cleanup must not evict the new one.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(state.hub.is_connected("dave").await);
    assert_eq!(state.hub.client_count().await, 1);

    assert!(state.hub.send_to_client("dave", &Envelope::error("hello")).await);
    let msg = tokio::time::timeout(Duration::from_secs(2), second.next())
        .await
        .expect("timed out")
        .unwrap()
        .unwrap();
    assert!(matches!(msg, Message::Text(_)));
}
