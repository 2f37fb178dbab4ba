//! Transcript messages pushed to callers over the control channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A line of transcript, either recognized caller speech or agent speech.
///
/// Serialized as `{"type":"transcript","speaker":...,"text":...,"timestamp":...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "transcript")]
pub struct TranscriptMessage {
    pub speaker: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptMessage {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}
