//! Voice providers for the voxrelay call agent.
//!
//! Wraps the hosted services the agent talks to: speech-to-text
//! transcription, text-to-speech synthesis (streamed or buffered) and chat
//! completion for the conversational turn. Also provides the per-session
//! accumulation buffer that batches caller audio before transcription, and
//! the agent's script (greeting and system prompt).
//!
//! All providers are plain HTTP clients built on `reqwest`; their base URLs
//! are configurable so tests can point them at local stub servers.

pub mod agent;
pub mod buffer;
pub mod chat;
pub mod config;
pub mod error;
pub mod stt;
pub mod tts;

pub use agent::AgentScript;
pub use buffer::SttBufferStore;
pub use chat::{ChatMessage, ChatService};
pub use config::VoiceConfig;
pub use error::VoiceError;
pub use stt::SttService;
pub use tts::{SpeechStream, TtsService, Voice};
