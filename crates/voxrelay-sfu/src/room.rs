//! Rooms, participants and the per-room task supervisor.

use crate::transport::{ControlChannel, InboundTrack, MediaSession, OutboundSink};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use voxrelay_types::ParticipantRole;

/// How long [`Room::shutdown`] waits for supervised tasks to observe cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// All lock acquisitions in this module are short map operations that never
// span an `.await`, so a poisoned lock only means another thread panicked
// mid-operation on a plain HashMap. Recover the guard instead of refusing
// service for the rest of the process.
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        tracing::error!("room lock poisoned, recovering");
        poisoned.into_inner()
    })
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        tracing::error!("room lock poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Identity of a participant that has not been provisioned yet.
#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub id: String,
    pub phone_number: Option<String>,
    pub role: ParticipantRole,
}

impl NewParticipant {
    /// The human caller; `id` doubles as the caller's session id.
    pub fn user(id: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            phone_number: Some(phone_number.into()),
            role: ParticipantRole::User,
        }
    }

    pub fn agent(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            phone_number: None,
            role: ParticipantRole::Agent,
        }
    }
}

/// A provisioned call participant.
///
/// The media session and the outbound sink exist for the participant's whole
/// lifetime; only the inbound track arrives later.
pub struct Participant {
    id: String,
    phone_number: Option<String>,
    role: ParticipantRole,
    joined_at: DateTime<Utc>,
    session: Arc<dyn MediaSession>,
    outbound: Arc<dyn OutboundSink>,
    inbound: RwLock<Option<Arc<dyn InboundTrack>>>,
    control: Option<Arc<dyn ControlChannel>>,
    cancel: CancellationToken,
}

impl Participant {
    pub(crate) fn new(
        identity: NewParticipant,
        session: Arc<dyn MediaSession>,
        outbound: Arc<dyn OutboundSink>,
        control: Option<Arc<dyn ControlChannel>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: identity.id,
            phone_number: identity.phone_number,
            role: identity.role,
            joined_at: Utc::now(),
            session,
            outbound,
            inbound: RwLock::new(None),
            control,
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }

    pub fn role(&self) -> ParticipantRole {
        self.role
    }

    pub fn is_agent(&self) -> bool {
        self.role.is_agent()
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    pub fn session(&self) -> &Arc<dyn MediaSession> {
        &self.session
    }

    pub fn outbound(&self) -> &Arc<dyn OutboundSink> {
        &self.outbound
    }

    pub fn control(&self) -> Option<&Arc<dyn ControlChannel>> {
        self.control.as_ref()
    }

    /// The remote audio track, once it has arrived.
    pub fn inbound(&self) -> Option<Arc<dyn InboundTrack>> {
        read_lock(&self.inbound).clone()
    }

    pub(crate) fn set_inbound(&self, track: Arc<dyn InboundTrack>) {
        *write_lock(&self.inbound) = Some(track);
    }

    /// Token cancelled when this participant leaves or its room is torn down.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("joined_at", &self.joined_at)
            .field("session", &self.session.id())
            .field("has_inbound", &self.inbound().is_some())
            .finish()
    }
}

/// Tracks every task spawned on behalf of a room.
struct RoomSupervisor {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl RoomSupervisor {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }
}

/// A call room: the participants that exchange audio with each other.
pub struct Room {
    id: String,
    created_at: DateTime<Utc>,
    participants: RwLock<HashMap<String, Arc<Participant>>>,
    last_activity_ms: AtomicI64,
    supervisor: RoomSupervisor,
}

impl Room {
    pub(crate) fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            participants: RwLock::new(HashMap::new()),
            last_activity_ms: AtomicI64::new(now.timestamp_millis()),
            supervisor: RoomSupervisor::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Adds (or replaces) a participant keyed by its id.
    pub fn add_participant(&self, participant: Arc<Participant>) {
        write_lock(&self.participants).insert(participant.id().to_string(), participant);
        self.touch();
    }

    /// Removes a participant. Removing an absent id is a no-op.
    pub fn remove_participant(&self, id: &str) -> Option<Arc<Participant>> {
        write_lock(&self.participants).remove(id)
    }

    pub fn participant(&self, id: &str) -> Option<Arc<Participant>> {
        read_lock(&self.participants).get(id).cloned()
    }

    /// A consistent snapshot of the current participants.
    pub fn participants(&self) -> Vec<Arc<Participant>> {
        read_lock(&self.participants).values().cloned().collect()
    }

    pub fn participant_count(&self) -> usize {
        read_lock(&self.participants).len()
    }

    /// Whether a human caller is still in the room.
    pub fn has_human(&self) -> bool {
        read_lock(&self.participants)
            .values()
            .any(|p| !p.is_agent())
    }

    /// Records activity now.
    pub fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        let ms = self.last_activity_ms.load(Ordering::Relaxed);
        DateTime::from_timestamp_millis(ms).unwrap_or(self.created_at)
    }

    /// Time elapsed since the last recorded activity.
    pub fn idle_for(&self) -> Duration {
        let ms = Utc::now().timestamp_millis() - self.last_activity_ms.load(Ordering::Relaxed);
        Duration::from_millis(ms.max(0) as u64)
    }

    /// A token cancelled when the room is torn down.
    pub fn child_token(&self) -> CancellationToken {
        self.supervisor.token.child_token()
    }

    pub fn is_shut_down(&self) -> bool {
        self.supervisor.token.is_cancelled()
    }

    /// Spawns a task that is tracked by the room and stops when `token` (or the
    /// room) is cancelled.
    pub fn spawn<F>(&self, task: &'static str, token: CancellationToken, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let room_id = self.id.clone();
        self.supervisor.tracker.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    tracing::debug!(room_id = %room_id, task, "supervised task cancelled");
                }
                () = fut => {}
            }
        });
    }

    /// Number of supervised tasks still running.
    pub fn task_count(&self) -> usize {
        self.supervisor.tracker.len()
    }

    /// Cancels every supervised task, closes every participant's session and
    /// waits (bounded) for the tasks to finish.
    pub async fn shutdown(&self) {
        self.supervisor.token.cancel();
        self.supervisor.tracker.close();

        let participants: Vec<_> = write_lock(&self.participants).drain().collect();
        for (id, participant) in participants {
            if let Err(e) = participant.session().close().await {
                tracing::warn!(
                    room_id = %self.id,
                    participant_id = %id,
                    "failed to close media session: {}",
                    e
                );
            }
        }

        if tokio::time::timeout(SHUTDOWN_GRACE, self.supervisor.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                room_id = %self.id,
                remaining = self.supervisor.tracker.len(),
                "room tasks did not stop within grace period"
            );
        }
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("participants", &self.participant_count())
            .finish()
    }
}
