//! Idle-room eviction.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use voxrelay_server::background::{start_idle_sweeper, sweep_idle_rooms};
use voxrelay_server::{config::Config, AppState};
use voxrelay_sfu::testing::MemoryTransport;

fn setup() -> (AppState, Arc<MemoryTransport>) {
    let transport = MemoryTransport::new();
    (AppState::new(&Config::default(), transport.clone()), transport)
}

#[tokio::test]
async fn active_rooms_survive_a_sweep() {
    let (state, _) = setup();
    state.orchestrator.start_session("+15550100").await.unwrap();
    state.orchestrator.start_session("+15550101").await.unwrap();

    let removed = sweep_idle_rooms(&state, Duration::from_secs(3600)).await;
    assert_eq!(removed, 0);
    assert_eq!(state.registry.room_count(), 2);
}

#[tokio::test]
async fn idle_rooms_are_torn_down() {
    let (state, transport) = setup();
    let started = state.orchestrator.start_session("+15550100").await.unwrap();
    state
        .stt_buffers
        .append(&started.session_id, &[1u8; 10])
        .await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    let removed = sweep_idle_rooms(&state, Duration::from_millis(10)).await;

    assert_eq!(removed, 1);
    assert_eq!(state.registry.room_count(), 0);
    assert!(transport.sessions().iter().all(|s| s.is_closed()));
    assert_eq!(state.stt_buffers.buffered_len(&started.session_id).await, 0);
}

#[tokio::test]
async fn buffers_outside_any_room_are_evicted() {
    let (state, _) = setup();
    for i in 0..50 {
        let batch = state
            .stt_buffers
            .append(&format!("ghost-{}", i), &[0u8; 999])
            .await;
        assert!(batch.is_none());
    }
    assert_eq!(state.stt_buffers.session_count().await, 50);

    // Fresh buffers survive a sweep with a long timeout.
    sweep_idle_rooms(&state, Duration::from_secs(3600)).await;
    assert_eq!(state.stt_buffers.session_count().await, 50);

    tokio::time::sleep(Duration::from_millis(30)).await;
    sweep_idle_rooms(&state, Duration::from_millis(10)).await;
    assert_eq!(state.stt_buffers.session_count().await, 0);
}

#[tokio::test]
async fn touched_room_is_kept() {
    let (state, _) = setup();
    let started = state.orchestrator.start_session("+15550100").await.unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    state.registry.get_room(&started.room_id).unwrap().touch();

    let removed = sweep_idle_rooms(&state, Duration::from_millis(50)).await;
    assert_eq!(removed, 0);
    assert_eq!(state.registry.room_count(), 1);
}

#[tokio::test]
async fn zero_timeout_disables_the_sweeper() {
    let (state, _) = setup();
    state.orchestrator.start_session("+15550100").await.unwrap();

    tokio::time::timeout(
        Duration::from_secs(1),
        start_idle_sweeper(Arc::new(state.clone()), 0, CancellationToken::new()),
    )
    .await
    .expect("disabled sweeper should return immediately");
    assert_eq!(state.registry.room_count(), 1);
}

#[tokio::test]
async fn sweeper_stops_on_shutdown() {
    let (state, _) = setup();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(start_idle_sweeper(
        Arc::new(state),
        3600,
        shutdown.clone(),
    ));

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("sweeper did not stop")
        .unwrap();
}
