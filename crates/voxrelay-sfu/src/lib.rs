//! Session and media-relay engine for voxrelay.
//!
//! A [`RoomRegistry`] holds the active call rooms. Each [`Room`] owns its
//! participants and a supervisor that tracks every task spawned on the
//! room's behalf, so tearing a room down cancels its forwarding work
//! deterministically.
//!
//! The [`MediaRelay`] provisions a media session per participant through the
//! [`MediaTransport`] contract and forwards inbound RTP packets, unmodified,
//! to the outbound sink of every other participant in the same room. The
//! transport engine itself (ICE, DTLS/SRTP, packetization) lives behind the
//! trait; [`WebRtcTransport`] adapts the `webrtc` crate to it.

pub mod error;
pub mod registry;
pub mod relay;
pub mod room;
pub mod transport;
pub mod webrtc_transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{RelayError, TrackReadError, TransportError};
pub use registry::RoomRegistry;
pub use relay::{forward_packet, ForwardReport, MediaRelay, RelayConfig};
pub use room::{NewParticipant, Participant, Room};
pub use transport::{
    ConnectivityState, ControlChannel, InboundTrack, MediaSession, MediaTransport, OutboundSink,
    ProvisionedSession, RtpPacket, SessionEvent,
};
pub use webrtc_transport::WebRtcTransport;
