//! Selective forwarding: session provisioning, packet fan-out and
//! offer/answer negotiation.

use crate::error::{RelayError, TrackReadError};
use crate::room::{NewParticipant, Participant, Room};
use crate::transport::{
    InboundTrack, MediaSession, MediaTransport, ProvisionedSession, RtpPacket, SessionEvent,
};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use voxrelay_types::{IceCandidate, IceServer, SessionDescription};

/// Label of the out-of-band text channel opened on every session.
pub const CONTROL_CHANNEL_LABEL: &str = "control";

/// Media relay settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// STUN/TURN servers handed to every new session.
    pub ice_servers: Vec<IceServer>,
    /// Upper bound on the wait for ICE candidate gathering when answering.
    pub negotiation_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ice_servers: Vec::new(),
            negotiation_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of fanning one packet out to a room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Writes `packet` verbatim to the outbound sink of every participant in
/// `room` except `source_id`.
///
/// Delivery is best-effort and at-most-once: a failed write is logged and
/// does not affect the other targets.
pub async fn forward_packet(room: &Room, source_id: &str, packet: &RtpPacket) -> ForwardReport {
    let mut report = ForwardReport::default();
    for target in room.participants() {
        if target.id() == source_id {
            continue;
        }
        match target.outbound().write_packet(packet).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(
                    room_id = %room.id(),
                    source_id = %source_id,
                    target_id = %target.id(),
                    "failed to write packet to participant: {}",
                    e
                );
            }
        }
    }
    room.touch();
    report
}

/// The selective forwarding unit.
pub struct MediaRelay {
    transport: Arc<dyn MediaTransport>,
    config: RelayConfig,
}

impl MediaRelay {
    pub fn new(transport: Arc<dyn MediaTransport>, config: RelayConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Provisions a participant's media session and starts consuming its events.
    ///
    /// On success the caller adds the returned participant to `room`. On
    /// failure nothing has been registered and any partially created session
    /// has been closed.
    pub async fn setup_participant_connection(
        &self,
        identity: NewParticipant,
        room: &Arc<Room>,
    ) -> Result<Arc<Participant>, RelayError> {
        let ProvisionedSession { session, events } = self
            .transport
            .create_session(&self.config.ice_servers)
            .await
            .map_err(RelayError::SessionSetup)?;

        let outbound = match session.add_outbound_audio_sink().await {
            Ok(sink) => sink,
            Err(e) => {
                close_quietly(session.as_ref(), room.id()).await;
                return Err(RelayError::SinkSetup(e));
            }
        };

        let control = match session.create_control_channel(CONTROL_CHANNEL_LABEL).await {
            Ok(channel) => Some(channel),
            Err(e) => {
                tracing::warn!(
                    room_id = %room.id(),
                    participant_id = %identity.id,
                    "control channel unavailable: {}",
                    e
                );
                None
            }
        };

        let participant = Arc::new(Participant::new(
            identity,
            session,
            outbound,
            control,
            room.child_token(),
        ));

        room.spawn(
            "participant-events",
            participant.cancellation().clone(),
            run_participant_events(Arc::downgrade(room), participant.clone(), events),
        );

        tracing::info!(
            room_id = %room.id(),
            participant_id = %participant.id(),
            role = participant.role().label(),
            session = %participant.session().id(),
            "participant connection set up"
        );
        Ok(participant)
    }

    /// Generates an offer and commits it as the local description.
    pub async fn create_offer(
        &self,
        session: &dyn MediaSession,
    ) -> Result<SessionDescription, RelayError> {
        let offer = session.create_offer().await.map_err(RelayError::Negotiation)?;
        session
            .set_local_description(offer.clone())
            .await
            .map_err(RelayError::Negotiation)?;
        Ok(offer)
    }

    /// Applies a remote offer and returns a self-contained answer.
    ///
    /// Waits for ICE candidate gathering to complete (bounded by the
    /// negotiation timeout) so the answer carries every local candidate.
    pub async fn create_answer(
        &self,
        session: &dyn MediaSession,
        offer: SessionDescription,
    ) -> Result<SessionDescription, RelayError> {
        session
            .set_remote_description(offer)
            .await
            .map_err(RelayError::Negotiation)?;
        let answer = session.create_answer().await.map_err(RelayError::Negotiation)?;
        session
            .set_local_description(answer)
            .await
            .map_err(RelayError::Negotiation)?;

        let timeout = self.config.negotiation_timeout;
        tokio::time::timeout(timeout, session.gathering_complete())
            .await
            .map_err(|_| RelayError::NegotiationTimeout(timeout))?;

        session
            .local_description()
            .await
            .ok_or(RelayError::MissingLocalDescription)
    }

    /// Applies the remote answer to an offer previously created by the relay.
    pub async fn apply_answer(
        &self,
        session: &dyn MediaSession,
        answer: SessionDescription,
    ) -> Result<(), RelayError> {
        session
            .set_remote_description(answer)
            .await
            .map_err(RelayError::Negotiation)
    }

    pub async fn add_ice_candidate(
        &self,
        session: &dyn MediaSession,
        candidate: IceCandidate,
    ) -> Result<(), RelayError> {
        session
            .add_ice_candidate(candidate)
            .await
            .map_err(RelayError::Candidate)
    }
}

async fn close_quietly(session: &dyn MediaSession, room_id: &str) {
    if let Err(e) = session.close().await {
        tracing::warn!(room_id = %room_id, session = %session.id(), "failed to close session: {}", e);
    }
}

/// Owns a participant's session events: records arriving tracks and starts
/// their forwarders, and removes the participant when connectivity ends.
async fn run_participant_events(
    room: Weak<Room>,
    participant: Arc<Participant>,
    mut events: mpsc::Receiver<SessionEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(room) = room.upgrade() else {
            break;
        };
        match event {
            SessionEvent::TrackArrived(track) => {
                tracing::info!(
                    room_id = %room.id(),
                    participant_id = %participant.id(),
                    track_id = %track.id(),
                    "inbound track arrived"
                );
                participant.set_inbound(track.clone());
                room.spawn(
                    "forward-track",
                    participant.cancellation().clone(),
                    forward_track(
                        Arc::downgrade(&room),
                        participant.id().to_string(),
                        track,
                    ),
                );
            }
            SessionEvent::ConnectivityChanged(state) => {
                tracing::info!(
                    room_id = %room.id(),
                    participant_id = %participant.id(),
                    state = %state,
                    "connectivity state changed"
                );
                if state.is_terminal() {
                    room.remove_participant(participant.id());
                    // This task runs under the participant's token; cancel
                    // only once the session is closed.
                    close_quietly(participant.session().as_ref(), room.id()).await;
                    participant.cancellation().cancel();
                    break;
                }
            }
        }
    }
}

/// Reads packets from one inbound track until it ends and fans each out to
/// the room's current participants, in read order.
async fn forward_track(room: Weak<Room>, source_id: String, track: Arc<dyn InboundTrack>) {
    loop {
        let packet = match track.read_packet().await {
            Ok(packet) => packet,
            Err(TrackReadError::EndOfStream) => {
                tracing::debug!(source_id = %source_id, track_id = %track.id(), "inbound track ended");
                return;
            }
            Err(e) => {
                tracing::warn!(source_id = %source_id, track_id = %track.id(), "{}", e);
                return;
            }
        };

        let Some(room) = room.upgrade() else {
            return;
        };
        forward_packet(&room, &source_id, &packet).await;
    }
}
