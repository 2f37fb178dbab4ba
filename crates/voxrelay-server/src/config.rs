//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;
use voxrelay_types::IceServer;
use voxrelay_voice::VoiceConfig;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Media relay settings.
    #[serde(default)]
    pub media: MediaConfig,

    /// Voice provider credentials and endpoints.
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Session lifetime and buffering settings.
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "voxrelay_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// A TURN relay and its credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnServerConfig {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub credential: String,
}

/// Connectivity servers handed to every media session.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_stun_servers")]
    pub stun_servers: Vec<String>,

    #[serde(default = "default_turn_servers")]
    pub turn_servers: Vec<TurnServerConfig>,

    /// Upper bound on ICE gathering while answering an offer.
    #[serde(default = "default_negotiation_timeout_secs")]
    pub negotiation_timeout_secs: u64,
}

/// Session lifetime and per-session buffering.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Rooms idle this long are torn down. 0 disables the sweeper.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Outbound queue length per signaling client.
    #[serde(default = "default_signaling_queue_capacity")]
    pub signaling_queue_capacity: usize,

    /// Buffered caller audio that triggers a transcription.
    #[serde(default = "default_stt_flush_threshold_bytes")]
    pub stt_flush_threshold_bytes: usize,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stun_servers() -> Vec<String> {
    vec![
        "stun:stun.l.google.com:19302".to_string(),
        "stun:stun1.l.google.com:19302".to_string(),
    ]
}

fn default_turn_servers() -> Vec<TurnServerConfig> {
    vec![TurnServerConfig {
        urls: vec!["turn:openrelay.metered.ca:80".to_string()],
        username: "openrelayproject".to_string(),
        credential: "openrelayproject".to_string(),
    }]
}

fn default_negotiation_timeout_secs() -> u64 {
    10
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

fn default_signaling_queue_capacity() -> usize {
    256
}

fn default_stt_flush_threshold_bytes() -> usize {
    60_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            stun_servers: default_stun_servers(),
            turn_servers: default_turn_servers(),
            negotiation_timeout_secs: default_negotiation_timeout_secs(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            signaling_queue_capacity: default_signaling_queue_capacity(),
            stt_flush_threshold_bytes: default_stt_flush_threshold_bytes(),
        }
    }
}

impl MediaConfig {
    /// STUN entries first, then each TURN relay with its credentials.
    pub fn ice_servers(&self) -> Vec<IceServer> {
        let mut servers = Vec::with_capacity(1 + self.turn_servers.len());
        if !self.stun_servers.is_empty() {
            servers.push(IceServer {
                urls: self.stun_servers.clone(),
                username: None,
                credential: None,
            });
        }
        for turn in &self.turn_servers {
            servers.push(IceServer {
                urls: turn.urls.clone(),
                username: Some(turn.username.clone()).filter(|u| !u.is_empty()),
                credential: Some(turn.credential.clone()).filter(|c| !c.is_empty()),
            });
        }
        servers
    }

    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_secs(self.negotiation_timeout_secs.max(1))
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VOXRELAY_HOST` overrides `server.host`
/// - `VOXRELAY_PORT` overrides `server.port`
/// - `VOXRELAY_LOG_LEVEL` overrides `logging.level`
/// - `VOXRELAY_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `OPENAI_API_KEY` overrides `voice.openai_api_key`
/// - `ELEVENLABS_API_KEY` overrides `voice.elevenlabs_api_key`
/// - `VOXRELAY_IDLE_TIMEOUT_SECS` overrides `sessions.idle_timeout_secs`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("VOXRELAY_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("VOXRELAY_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = var("VOXRELAY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("VOXRELAY_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(key) = var("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
        config.voice.openai_api_key = key;
    }
    if let Some(key) = var("ELEVENLABS_API_KEY").filter(|k| !k.is_empty()) {
        config.voice.elevenlabs_api_key = key;
    }
    if let Some(secs) = var("VOXRELAY_IDLE_TIMEOUT_SECS") {
        if let Ok(parsed) = secs.parse() {
            config.sessions.idle_timeout_secs = parsed;
        }
    }
}
