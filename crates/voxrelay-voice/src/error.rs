use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Chat completion error: {0}")]
    Chat(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
