use serde::{Deserialize, Serialize};
use std::fmt;

/// Voice the agent speaks with unless a caller asks for another one.
pub const DEFAULT_VOICE_ID: &str = "1qEiC6qsybMkmnNdVMbK";

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_elevenlabs_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_voice_id() -> String {
    DEFAULT_VOICE_ID.to_string()
}

fn default_tts_model_id() -> String {
    "eleven_flash_v2_5".to_string()
}

/// Credentials and endpoints of the hosted voice providers.
#[derive(Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Key for the transcription and chat-completion provider. Empty disables both.
    #[serde(default, skip_serializing)]
    pub openai_api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_stt_model")]
    pub stt_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Language hint passed to transcription. Empty lets the provider detect it.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing)]
    pub elevenlabs_api_key: String,
    #[serde(default = "default_elevenlabs_base_url")]
    pub elevenlabs_base_url: String,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_tts_model_id")]
    pub tts_model_id: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: default_openai_base_url(),
            stt_model: default_stt_model(),
            chat_model: default_chat_model(),
            language: default_language(),
            elevenlabs_api_key: String::new(),
            elevenlabs_base_url: default_elevenlabs_base_url(),
            voice_id: default_voice_id(),
            tts_model_id: default_tts_model_id(),
        }
    }
}

impl fmt::Debug for VoiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceConfig")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("stt_model", &self.stt_model)
            .field("chat_model", &self.chat_model)
            .field("language", &self.language)
            .field("elevenlabs_api_key", &redact(&self.elevenlabs_api_key))
            .field("elevenlabs_base_url", &self.elevenlabs_base_url)
            .field("voice_id", &self.voice_id)
            .field("tts_model_id", &self.tts_model_id)
            .finish()
    }
}

pub(crate) fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "[UNSET]"
    } else {
        "[REDACTED]"
    }
}
