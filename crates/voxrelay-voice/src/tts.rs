use crate::config::{redact, VoiceConfig};
use crate::error::VoiceError;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Timeout for buffered (non-streamed) requests.
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

/// Streamed requests only bound connection setup; the body may take as long
/// as the utterance.
const TTS_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Chunked `audio/mpeg` body of a streamed synthesis. Dropping it closes the
/// underlying response.
pub type SpeechStream = BoxStream<'static, Result<Bytes, VoiceError>>;

/// A voice offered by the synthesis provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
}

#[derive(Deserialize)]
struct VoicesBody {
    voices: Vec<Voice>,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_settings: Option<VoiceSettings>,
}

/// Client for an ElevenLabs-compatible text-to-speech API.
#[derive(Clone)]
pub struct TtsService {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model_id: String,
    default_voice: String,
}

impl fmt::Debug for TtsService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtsService")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model_id", &self.model_id)
            .field("default_voice", &self.default_voice)
            .finish()
    }
}

impl TtsService {
    pub fn new(config: &VoiceConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(TTS_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: config.elevenlabs_api_key.clone(),
            base_url: config.elevenlabs_base_url.trim_end_matches('/').to_string(),
            model_id: config.tts_model_id.clone(),
            default_voice: config.voice_id.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// The voice used when a caller passes an empty voice id.
    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }

    fn check_request(&self, text: &str) -> Result<(), VoiceError> {
        if !self.is_configured() {
            return Err(VoiceError::Config(
                "speech synthesis API key is not configured".to_string(),
            ));
        }
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }
        Ok(())
    }

    fn voice_or_default<'a>(&'a self, voice_id: &'a str) -> &'a str {
        if voice_id.is_empty() {
            &self.default_voice
        } else {
            voice_id
        }
    }

    /// Starts a streamed synthesis of `text` and returns the audio as it arrives.
    pub async fn stream_speech(&self, text: &str, voice_id: &str) -> Result<SpeechStream, VoiceError> {
        self.check_request(text)?;
        let url = format!(
            "{}/v1/text-to-speech/{}/stream",
            self.base_url,
            self.voice_or_default(voice_id)
        );
        let body = SynthesisRequest {
            text,
            model_id: &self.model_id,
            voice_settings: Some(VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
            }),
        };

        let resp = self
            .client
            .post(url)
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!("provider returned {}: {}", status, body)));
        }

        Ok(resp.bytes_stream().map(|chunk| chunk.map_err(VoiceError::from)).boxed())
    }

    /// Synthesizes `text` and returns the complete audio.
    pub async fn generate_speech(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, VoiceError> {
        self.check_request(text)?;
        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.base_url,
            self.voice_or_default(voice_id)
        );
        let body = SynthesisRequest {
            text,
            model_id: &self.model_id,
            voice_settings: None,
        };

        let resp = self
            .client
            .post(url)
            .timeout(TTS_TIMEOUT)
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!("provider returned {}: {}", status, body)));
        }

        Ok(resp.bytes().await?.to_vec())
    }

    /// Lists the voices available to the configured account.
    pub async fn list_voices(&self) -> Result<Vec<Voice>, VoiceError> {
        if !self.is_configured() {
            return Err(VoiceError::Config(
                "speech synthesis API key is not configured".to_string(),
            ));
        }
        let resp = self
            .client
            .get(format!("{}/v1/voices", self.base_url))
            .timeout(TTS_TIMEOUT)
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!("provider returned {}: {}", status, body)));
        }

        let body: VoicesBody = resp
            .json()
            .await
            .map_err(|e| VoiceError::Tts(format!("invalid voices response: {}", e)))?;
        Ok(body.voices)
    }
}
