//! The media-transport collaborator contract.
//!
//! The relay never talks to an ICE/DTLS/RTP engine directly. It provisions
//! sessions through [`MediaTransport`] and drives them through
//! [`MediaSession`]. Engine callbacks (track arrival, connectivity changes)
//! are not invoked on relay state; implementations publish them as
//! [`SessionEvent`]s onto the channel returned with each session, and the
//! relay consumes that channel from a single owning task.

use crate::error::{TrackReadError, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use voxrelay_types::{IceCandidate, IceServer, SessionDescription};

/// A raw RTP packet. The relay forwards it without decoding.
pub type RtpPacket = Bytes;

/// Capacity of the per-session event channel.
pub const SESSION_EVENT_CAPACITY: usize = 32;

/// ICE connectivity state as reported by the transport engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectivityState {
    /// Failed and closed sessions never recover; their participant leaves the room.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event published by the transport engine for one session.
pub enum SessionEvent {
    /// The remote side's audio track arrived.
    TrackArrived(Arc<dyn InboundTrack>),
    /// The ICE connectivity state changed.
    ConnectivityChanged(ConnectivityState),
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrackArrived(track) => f
                .debug_tuple("TrackArrived")
                .field(&track.id())
                .finish(),
            Self::ConnectivityChanged(state) => {
                f.debug_tuple("ConnectivityChanged").field(state).finish()
            }
        }
    }
}

/// A freshly created session together with the receiving end of its event channel.
pub struct ProvisionedSession {
    pub session: Arc<dyn MediaSession>,
    pub events: mpsc::Receiver<SessionEvent>,
}

/// Factory for media sessions.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Creates a session configured with the given STUN/TURN servers.
    async fn create_session(
        &self,
        ice_servers: &[IceServer],
    ) -> Result<ProvisionedSession, TransportError>;
}

/// One peer-to-peer media session (a peer connection).
#[async_trait]
pub trait MediaSession: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> String;

    /// Creates and attaches the single outbound audio sink of this session.
    async fn add_outbound_audio_sink(&self) -> Result<Arc<dyn OutboundSink>, TransportError>;

    /// Opens an out-of-band text channel carried by this session.
    async fn create_control_channel(
        &self,
        label: &str,
    ) -> Result<Arc<dyn ControlChannel>, TransportError>;

    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    /// Generates an answer to the remote description already applied.
    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(&self, desc: SessionDescription)
        -> Result<(), TransportError>;

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError>;

    /// The current local description, including any candidates gathered so far.
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Resolves once ICE candidate gathering has completed.
    async fn gathering_complete(&self);

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// The local track the relay writes other participants' packets into.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    async fn write_packet(&self, packet: &RtpPacket) -> Result<(), TransportError>;
}

/// The remote side's audio track.
#[async_trait]
pub trait InboundTrack: Send + Sync {
    fn id(&self) -> String;

    /// Waits for the next packet. [`TrackReadError::EndOfStream`] ends the track.
    async fn read_packet(&self) -> Result<RtpPacket, TrackReadError>;
}

/// An out-of-band text channel (e.g. for transcripts).
#[async_trait]
pub trait ControlChannel: Send + Sync {
    fn label(&self) -> String;

    /// Resolves once the channel can carry messages.
    async fn wait_open(&self);

    async fn send_text(&self, text: String) -> Result<(), TransportError>;
}
