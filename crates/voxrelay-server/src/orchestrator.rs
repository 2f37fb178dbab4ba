//! Turns a "start a call" request into a wired two-party room and runs the
//! agent's opening turn.

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use voxrelay_sfu::{MediaRelay, NewParticipant, Participant, RelayError, RoomRegistry};
use voxrelay_types::{ParticipantRole, TranscriptMessage};
use voxrelay_voice::{AgentScript, TtsService, VoiceError};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("phone_number is required")]
    MissingPhoneNumber,

    #[error(transparent)]
    Setup(#[from] RelayError),
}

/// Identifiers handed back to the caller of a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedSession {
    pub room_id: String,
    /// The caller's participant id; also their bearer token.
    pub session_id: String,
    pub agent_id: String,
}

pub struct SessionOrchestrator {
    registry: Arc<RoomRegistry>,
    relay: Arc<MediaRelay>,
    tts: Arc<TtsService>,
    script: AgentScript,
    voice_id: String,
}

impl SessionOrchestrator {
    pub fn new(
        registry: Arc<RoomRegistry>,
        relay: Arc<MediaRelay>,
        tts: Arc<TtsService>,
        script: AgentScript,
        voice_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            relay,
            tts,
            script,
            voice_id: voice_id.into(),
        }
    }

    /// Creates a room holding the caller and the agent, then starts the
    /// agent's greeting in the background.
    ///
    /// If either participant cannot be provisioned the room is torn down
    /// before the error is returned, so no half-built room stays reachable.
    pub async fn start_session(&self, phone_number: &str) -> Result<StartedSession, OrchestratorError> {
        let phone_number = phone_number.trim();
        if phone_number.is_empty() {
            return Err(OrchestratorError::MissingPhoneNumber);
        }

        let room = self.registry.create_room();
        let session_id = voxrelay_types::generate_id();
        let agent_id = voxrelay_types::generate_id();

        let identities = [
            NewParticipant::user(session_id.clone(), phone_number),
            NewParticipant::agent(agent_id.clone()),
        ];
        let mut user = None;
        for identity in identities {
            match self.relay.setup_participant_connection(identity, &room).await {
                Ok(participant) => {
                    if participant.role() == ParticipantRole::User {
                        user = Some(participant.clone());
                    }
                    room.add_participant(participant);
                }
                Err(e) => {
                    tracing::error!(room_id = %room.id(), "session setup failed: {}", e);
                    self.registry.teardown_room(room.id()).await;
                    return Err(e.into());
                }
            }
        }

        if let Some(user) = user {
            let greeting = self.script.greeting_for(phone_number);
            room.spawn(
                "agent-greeting",
                user.cancellation().clone(),
                run_greeting(
                    user,
                    greeting,
                    self.tts.clone(),
                    self.voice_id.clone(),
                    self.relay.config().negotiation_timeout,
                ),
            );
        }

        tracing::info!(
            room_id = %room.id(),
            session_id = %session_id,
            agent_id = %agent_id,
            "voice session started"
        );

        Ok(StartedSession {
            room_id: room.id().to_string(),
            session_id,
            agent_id,
        })
    }
}

/// The agent's opening turn: the greeting transcript on the caller's control
/// channel, then the greeting audio.
async fn run_greeting(
    user: Arc<Participant>,
    greeting: String,
    tts: Arc<TtsService>,
    voice_id: String,
    open_timeout: Duration,
) {
    match user.control() {
        Some(control) => {
            if tokio::time::timeout(open_timeout, control.wait_open())
                .await
                .is_err()
            {
                tracing::warn!(
                    participant_id = %user.id(),
                    "control channel did not open in time, skipping greeting transcript"
                );
            } else {
                let message = TranscriptMessage::new(ParticipantRole::Agent.label(), greeting.clone());
                match serde_json::to_string(&message) {
                    Ok(json) => {
                        if let Err(e) = control.send_text(json).await {
                            tracing::warn!(participant_id = %user.id(), "failed to send greeting transcript: {}", e);
                        }
                    }
                    Err(e) => tracing::error!("failed to serialize transcript: {}", e),
                }
            }
        }
        None => {
            tracing::debug!(participant_id = %user.id(), "no control channel, skipping greeting transcript");
        }
    }

    let mut stream = match tts.stream_speech(&greeting, &voice_id).await {
        Ok(stream) => stream,
        Err(VoiceError::Config(msg)) => {
            tracing::debug!(participant_id = %user.id(), "greeting audio skipped: {}", msg);
            return;
        }
        Err(e) => {
            tracing::warn!(participant_id = %user.id(), "greeting synthesis failed: {}", e);
            return;
        }
    };

    let mut total = 0usize;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => total += bytes.len(),
            Err(e) => {
                tracing::warn!(participant_id = %user.id(), "greeting audio stream failed: {}", e);
                break;
            }
        }
    }
    drop(stream);

    tracing::info!(participant_id = %user.id(), bytes = total, "greeting audio synthesized");
}
