use std::time::Duration;
use thiserror::Error;

/// Failures reported by a media-transport implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("session creation failed: {0}")]
    SessionCreation(String),

    #[error("outbound audio sink failed: {0}")]
    Sink(String),

    #[error("control channel failed: {0}")]
    ControlChannel(String),

    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("ICE candidate rejected: {0}")]
    Candidate(String),

    #[error("packet write failed: {0}")]
    Write(String),

    #[error("session is closed")]
    Closed,
}

/// Outcome of reading from an inbound track that did not yield a packet.
#[derive(Error, Debug)]
pub enum TrackReadError {
    #[error("end of stream")]
    EndOfStream,

    #[error("track read failed: {0}")]
    Read(String),
}

/// Errors surfaced synchronously by the media relay to its caller.
///
/// None of these are retried internally.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("failed to create media session: {0}")]
    SessionSetup(#[source] TransportError),

    #[error("failed to attach outbound audio sink: {0}")]
    SinkSetup(#[source] TransportError),

    #[error("failed to negotiate session: {0}")]
    Negotiation(#[source] TransportError),

    #[error("ICE candidate gathering did not complete within {0:?}")]
    NegotiationTimeout(Duration),

    #[error("session has no local description after negotiation")]
    MissingLocalDescription,

    #[error("failed to add ICE candidate: {0}")]
    Candidate(#[source] TransportError),
}
