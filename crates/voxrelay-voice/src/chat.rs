use crate::config::{redact, VoiceConfig};
use crate::error::VoiceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const CHAT_TIMEOUT: Duration = Duration::from_secs(60);

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint.
///
/// Produces the agent's replies once the conversational loop runs after the
/// greeting; nothing in the call path invokes it yet.
#[derive(Clone)]
pub struct ChatService {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl fmt::Debug for ChatService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatService")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl ChatService {
    pub fn new(config: &VoiceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CHAT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.chat_model.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Returns the assistant's reply to `history`, with `system_prompt` sent
    /// as the first message.
    pub async fn complete(
        &self,
        history: &[ChatMessage],
        system_prompt: &str,
    ) -> Result<String, VoiceError> {
        if !self.is_configured() {
            return Err(VoiceError::Config(
                "chat completion API key is not configured".to_string(),
            ));
        }

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend_from_slice(history);

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest {
                model: &self.model,
                messages,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VoiceError::Chat(format!("provider returned {}: {}", status, body)));
        }

        let body: CompletionBody = resp
            .json()
            .await
            .map_err(|e| VoiceError::Chat(format!("invalid completion response: {}", e)))?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| VoiceError::Chat("provider returned no choices".to_string()))
    }
}
