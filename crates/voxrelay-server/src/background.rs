//! Background tasks for the voxrelay server.
//!
//! Includes:
//! - Evicting idle and abandoned rooms.

use crate::AppState;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

/// A room without a caller is kept at most this long, so a room still being
/// set up is never mistaken for an abandoned one.
const ABANDONED_GRACE: Duration = Duration::from_secs(30);

/// Tears down every room idle for at least `idle_timeout`, and every room
/// whose caller has left. Returns how many rooms were removed.
///
/// Caller audio that has not grown for `idle_timeout` is dropped as well.
pub async fn sweep_idle_rooms(state: &AppState, idle_timeout: Duration) -> usize {
    let abandoned_after = idle_timeout.min(ABANDONED_GRACE);
    let mut removed = 0;

    for room in state.registry.all_rooms() {
        let idle = room.idle_for();
        let abandoned = !room.has_human() && idle >= abandoned_after;
        if idle < idle_timeout && !abandoned {
            continue;
        }

        tracing::info!(
            room_id = %room.id(),
            idle_secs = idle.as_secs(),
            abandoned,
            "evicting room"
        );
        if state.teardown_room(room.id()).await {
            removed += 1;
        }
    }

    let evicted = state.stt_buffers.evict_idle(idle_timeout).await;
    if evicted > 0 {
        tracing::info!(count = evicted, "evicted idle STT buffers");
    }

    removed
}

/// Starts the idle-room sweeper.
///
/// This task runs until `shutdown` is cancelled, periodically evicting rooms
/// that saw no activity for `idle_timeout_seconds`.
pub async fn start_idle_sweeper(
    state: Arc<AppState>,
    idle_timeout_seconds: u64,
    shutdown: CancellationToken,
) {
    if idle_timeout_seconds == 0 {
        tracing::warn!("idle room sweeper disabled (idle_timeout=0)");
        return;
    }

    // Run check every 60 seconds or threshold/2, whichever is smaller (but min 1s)
    let interval_seconds = (idle_timeout_seconds / 2).clamp(1, 60);
    let interval = Duration::from_secs(interval_seconds);
    let idle_timeout = Duration::from_secs(idle_timeout_seconds);

    tracing::info!(
        idle_timeout_seconds,
        interval_seconds,
        "starting idle room sweeper"
    );

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = sleep(interval) => {}
        }

        let removed = sweep_idle_rooms(&state, idle_timeout).await;
        if removed > 0 {
            tracing::info!(count = removed, "evicted idle rooms");
        }
    }

    tracing::debug!("idle room sweeper stopped");
}
