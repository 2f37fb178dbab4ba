use crate::config::{redact, VoiceConfig};
use crate::error::VoiceError;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Maximum audio input size for STT (25 MiB, the provider's upload limit).
const MAX_STT_INPUT_BYTES: usize = 25 * 1024 * 1024;

/// Timeout for a transcription request.
const STT_TIMEOUT: Duration = Duration::from_secs(120);

/// File name attached to uploads; the provider sniffs the container from it.
const UPLOAD_FILE_NAME: &str = "audio.webm";

#[derive(Deserialize)]
struct TranscriptionBody {
    text: String,
}

/// Client for an OpenAI-compatible `/v1/audio/transcriptions` endpoint.
#[derive(Clone)]
pub struct SttService {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl fmt::Debug for SttService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SttService")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl SttService {
    pub fn new(config: &VoiceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(STT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.stt_model.clone(),
        }
    }

    /// Whether an API key is present.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Uploads `audio_data` for transcription. An empty `language` lets the
    /// provider detect it.
    pub async fn transcribe(&self, audio_data: &[u8], language: &str) -> Result<String, VoiceError> {
        if !self.is_configured() {
            return Err(VoiceError::Config(
                "transcription API key is not configured".to_string(),
            ));
        }
        if audio_data.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::Stt(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio_data.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        let file = Part::bytes(audio_data.to_vec())
            .file_name(UPLOAD_FILE_NAME)
            .mime_str("audio/webm")?;
        let mut form = Form::new().part("file", file).text("model", self.model.clone());
        if !language.is_empty() {
            form = form.text("language", language.to_string());
        }

        let resp = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VoiceError::Stt(format!("provider returned {}: {}", status, body)));
        }

        let body: TranscriptionBody = resp
            .json()
            .await
            .map_err(|e| VoiceError::Stt(format!("invalid transcription response: {}", e)))?;
        Ok(body.text)
    }
}
