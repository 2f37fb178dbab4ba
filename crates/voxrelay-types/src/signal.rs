//! Signaling envelope and negotiation payloads.
//!
//! Field names follow the browser `RTCSessionDescriptionInit` and
//! `RTCIceCandidateInit` dictionaries so that clients can forward the
//! objects produced by their peer connection unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role of a session description in the offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Offer => "offer",
            Self::Pranswer => "pranswer",
            Self::Answer => "answer",
            Self::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

/// A session description (SDP) together with its offer/answer role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A remote connectivity candidate trickled by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// A STUN or TURN server handed to the media transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// A credential-less STUN entry.
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// The discriminant of an [`Envelope`], used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Offer,
    Answer,
    Candidate,
    Error,
    Data,
}

impl EnvelopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
            Self::Error => "error",
            Self::Data => "data",
        }
    }
}

/// A signaling message relayed between WebSocket clients.
///
/// The `type` tag decides which payload field must be present: a message
/// tagged `offer` without an `sdp` does not decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    Offer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        sdp: SessionDescription,
    },
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        sdp: SessionDescription,
    },
    Candidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        candidate: IceCandidate,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        error: String,
    },
    Data {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        data: serde_json::Value,
    },
}

impl Envelope {
    /// Builds an `error` envelope not bound to any room.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            room_id: None,
            error: message.into(),
        }
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Self::Offer { .. } => EnvelopeKind::Offer,
            Self::Answer { .. } => EnvelopeKind::Answer,
            Self::Candidate { .. } => EnvelopeKind::Candidate,
            Self::Error { .. } => EnvelopeKind::Error,
            Self::Data { .. } => EnvelopeKind::Data,
        }
    }

    pub fn room_id(&self) -> Option<&str> {
        match self {
            Self::Offer { room_id, .. }
            | Self::Answer { room_id, .. }
            | Self::Candidate { room_id, .. }
            | Self::Error { room_id, .. }
            | Self::Data { room_id, .. } => room_id.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn offer_envelope_uses_type_tag_and_browser_sdp_shape() {
        let env = Envelope::Offer {
            room_id: Some("room-1".to_string()),
            sdp: SessionDescription::offer("v=0"),
        };
        let value = serde_json::to_value(&env).expect("serialization should not fail");
        assert_eq!(value["type"], "offer");
        assert_eq!(value["room_id"], "room-1");
        assert_eq!(value["sdp"]["type"], "offer");
        assert_eq!(value["sdp"]["sdp"], "v=0");
        assert!(value.get("candidate").is_none());
    }

    #[test]
    fn candidate_envelope_decodes_browser_candidate() {
        let raw = json!({
            "type": "candidate",
            "candidate": {
                "candidate": "candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host",
                "sdpMid": "0",
                "sdpMLineIndex": 0
            }
        });
        let env: Envelope = serde_json::from_value(raw).expect("candidate should decode");
        assert_eq!(env.kind(), EnvelopeKind::Candidate);
        assert_eq!(env.room_id(), None);
        match env {
            Envelope::Candidate { candidate, .. } => {
                assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
                assert_eq!(candidate.sdp_mline_index, Some(0));
            }
            other => panic!("unexpected envelope: {:?}", other),
        }
    }

    #[test]
    fn payload_must_match_kind() {
        let missing_sdp = json!({ "type": "answer", "room_id": "r" });
        assert!(serde_json::from_value::<Envelope>(missing_sdp).is_err());

        let unknown_kind = json!({ "type": "hangup" });
        assert!(serde_json::from_value::<Envelope>(unknown_kind).is_err());
    }

    #[test]
    fn error_envelope_has_no_room() {
        let value = serde_json::to_value(Envelope::error("bad")).unwrap();
        assert_eq!(value, json!({ "type": "error", "error": "bad" }));
    }
}
