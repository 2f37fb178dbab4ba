//! Shared wire types for the voxrelay voice-call broker.
//!
//! This crate provides the types that cross crate and process boundaries:
//! the signaling envelope relayed over WebSocket, session descriptions and
//! ICE candidates exchanged during offer/answer negotiation, ICE server
//! configuration, and the JSON bodies of the HTTP negotiation endpoints.
//!
//! Every other crate in the workspace depends on `voxrelay-types` for these
//! definitions so that the media relay, the signaling relay and the HTTP
//! surface agree on a single wire format.

use serde::{Deserialize, Serialize};

pub mod api;
pub mod signal;
pub mod voice;

pub use signal::{Envelope, EnvelopeKind, IceCandidate, IceServer, SdpType, SessionDescription};
pub use voice::TranscriptMessage;

/// Generates a fresh opaque identifier for rooms, participants and sessions.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The two kinds of participant a call room holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    /// The human caller.
    User,
    /// The automated assistant.
    Agent,
}

impl ParticipantRole {
    /// Returns the label used in transcripts and log fields.
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }

    pub fn is_agent(self) -> bool {
        matches!(self, Self::Agent)
    }
}
