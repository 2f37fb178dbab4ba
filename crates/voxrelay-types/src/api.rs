//! Request and response bodies of the HTTP negotiation endpoints.

use crate::signal::{IceCandidate, SessionDescription};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/voice/start`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub phone_number: String,
}

/// Response of `POST /api/voice/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub room_id: String,
    /// Opaque bearer for later calls. Currently identical to `session_id`.
    pub token: String,
}

/// Body of `POST /api/voice/offer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRequest {
    pub session_id: String,
    pub room_id: String,
    pub offer: SessionDescription,
}

/// Response of `POST /api/voice/offer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferResponse {
    pub answer: SessionDescription,
}

/// Body of `POST /api/voice/answer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub session_id: String,
    pub room_id: String,
    pub answer: SessionDescription,
}

/// Body of `POST /api/voice/ice-candidate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidateRequest {
    pub session_id: String,
    pub room_id: String,
    pub candidate: IceCandidate,
}

/// `{"status":"ok"}` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Response of `POST /api/voice/stt` once a batch has been transcribed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
}
