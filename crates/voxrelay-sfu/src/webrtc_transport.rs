//! [`MediaTransport`] backed by the `webrtc` crate.
//!
//! Each session is an `RTCPeerConnection` with the default codec set and
//! interceptors. The outbound sink is a static Opus RTP track, the control
//! channel is a data channel, and engine callbacks are forwarded as
//! [`SessionEvent`]s.

use crate::error::{TrackReadError, TransportError};
use crate::transport::{
    ConnectivityState, ControlChannel, InboundTrack, MediaSession, MediaTransport, OutboundSink,
    ProvisionedSession, RtpPacket, SessionEvent, SESSION_EVENT_CAPACITY,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use voxrelay_types::{IceCandidate, IceServer, SdpType, SessionDescription};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;
use webrtc::util::Marshal;

/// Stream id of the outbound audio track.
const OUTBOUND_STREAM_ID: &str = "voxrelay-audio";

/// Size of the buffer used to drain RTCP from outbound senders.
const RTCP_BUFFER_SIZE: usize = 1500;

impl From<RTCIceConnectionState> for ConnectivityState {
    fn from(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::Checking => ConnectivityState::Checking,
            RTCIceConnectionState::Connected => ConnectivityState::Connected,
            RTCIceConnectionState::Completed => ConnectivityState::Completed,
            RTCIceConnectionState::Disconnected => ConnectivityState::Disconnected,
            RTCIceConnectionState::Failed => ConnectivityState::Failed,
            RTCIceConnectionState::Closed => ConnectivityState::Closed,
            _ => ConnectivityState::New,
        }
    }
}

fn to_rtc_ice_server(server: &IceServer) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
        ..Default::default()
    }
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription, TransportError> {
    let result = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp),
        SdpType::Rollback => {
            return Err(TransportError::Negotiation(
                "rollback descriptions are not supported".to_string(),
            ))
        }
    };
    result.map_err(|e| TransportError::Negotiation(format!("invalid SDP: {}", e)))
}

fn from_rtc_description(desc: RTCSessionDescription) -> Result<SessionDescription, TransportError> {
    let sdp_type = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        other => {
            return Err(TransportError::Negotiation(format!(
                "unexpected SDP type: {}",
                other
            )))
        }
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: desc.sdp,
    })
}

fn negotiation_error(e: webrtc::Error) -> TransportError {
    TransportError::Negotiation(e.to_string())
}

fn build_api() -> Result<API, webrtc::Error> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

/// Creates `RTCPeerConnection`-backed sessions.
#[derive(Debug, Default, Clone)]
pub struct WebRtcTransport;

impl WebRtcTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaTransport for WebRtcTransport {
    async fn create_session(
        &self,
        ice_servers: &[IceServer],
    ) -> Result<ProvisionedSession, TransportError> {
        let api = build_api().map_err(|e| TransportError::SessionCreation(e.to_string()))?;
        let config = RTCConfiguration {
            ice_servers: ice_servers.iter().map(to_rtc_ice_server).collect(),
            ..Default::default()
        };
        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| TransportError::SessionCreation(e.to_string()))?,
        );
        let id = voxrelay_types::generate_id();

        let (events_tx, events_rx) = mpsc::channel(SESSION_EVENT_CAPACITY);

        let track_tx = events_tx.clone();
        let session_id = id.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = track_tx.clone();
                let session_id = session_id.clone();
                Box::pin(async move {
                    if track.kind() != RTPCodecType::Audio {
                        tracing::debug!(session = %session_id, "ignoring non-audio track");
                        return;
                    }
                    let inbound: Arc<dyn InboundTrack> = Arc::new(WebRtcInboundTrack { track });
                    if tx.send(SessionEvent::TrackArrived(inbound)).await.is_err() {
                        tracing::debug!(session = %session_id, "session event receiver dropped");
                    }
                })
            },
        ));

        let state_tx = events_tx;
        let session_id = id.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            let tx = state_tx.clone();
            let session_id = session_id.clone();
            Box::pin(async move {
                if tx
                    .send(SessionEvent::ConnectivityChanged(state.into()))
                    .await
                    .is_err()
                {
                    tracing::debug!(session = %session_id, "session event receiver dropped");
                }
            })
        }));

        Ok(ProvisionedSession {
            session: Arc::new(WebRtcSession { id, pc }),
            events: events_rx,
        })
    }
}

struct WebRtcSession {
    id: String,
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl MediaSession for WebRtcSession {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn add_outbound_audio_sink(&self) -> Result<Arc<dyn OutboundSink>, TransportError> {
        let track = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            OUTBOUND_STREAM_ID.to_owned(),
        ));

        let sender = self
            .pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| TransportError::Sink(e.to_string()))?;

        // Interceptors only run while RTCP is read from the sender.
        tokio::spawn(async move {
            let mut buf = vec![0u8; RTCP_BUFFER_SIZE];
            while sender.read(&mut buf).await.is_ok() {}
        });

        Ok(Arc::new(WebRtcOutboundSink { track }))
    }

    async fn create_control_channel(
        &self,
        label: &str,
    ) -> Result<Arc<dyn ControlChannel>, TransportError> {
        let channel = self
            .pc
            .create_data_channel(label, None)
            .await
            .map_err(|e| TransportError::ControlChannel(e.to_string()))?;

        let (open_tx, open_rx) =
            watch::channel(channel.ready_state() == RTCDataChannelState::Open);
        channel.on_open(Box::new(move || {
            let _ = open_tx.send(true);
            Box::pin(async {})
        }));

        Ok(Arc::new(WebRtcControlChannel {
            channel,
            open: open_rx,
        }))
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let offer = self.pc.create_offer(None).await.map_err(negotiation_error)?;
        from_rtc_description(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let answer = self.pc.create_answer(None).await.map_err(negotiation_error)?;
        from_rtc_description(answer)
    }

    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError> {
        self.pc
            .set_local_description(to_rtc_description(desc)?)
            .await
            .map_err(negotiation_error)
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError> {
        self.pc
            .set_remote_description(to_rtc_description(desc)?)
            .await
            .map_err(negotiation_error)
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let desc = self.pc.local_description().await?;
        from_rtc_description(desc).ok()
    }

    async fn gathering_complete(&self) {
        let mut done = self.pc.gathering_complete_promise().await;
        let _ = done.recv().await;
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| TransportError::Candidate(e.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.pc
            .close()
            .await
            .map_err(|e| TransportError::Negotiation(e.to_string()))
    }
}

struct WebRtcOutboundSink {
    track: Arc<TrackLocalStaticRTP>,
}

#[async_trait]
impl OutboundSink for WebRtcOutboundSink {
    async fn write_packet(&self, packet: &RtpPacket) -> Result<(), TransportError> {
        self.track
            .write(packet)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Write(e.to_string()))
    }
}

struct WebRtcInboundTrack {
    track: Arc<TrackRemote>,
}

#[async_trait]
impl InboundTrack for WebRtcInboundTrack {
    fn id(&self) -> String {
        self.track.id()
    }

    async fn read_packet(&self) -> Result<RtpPacket, TrackReadError> {
        match self.track.read_rtp().await {
            Ok((packet, _attributes)) => packet
                .marshal()
                .map_err(|e| TrackReadError::Read(e.to_string())),
            Err(webrtc::Error::ErrClosedPipe) => Err(TrackReadError::EndOfStream),
            Err(e) => Err(TrackReadError::Read(e.to_string())),
        }
    }
}

struct WebRtcControlChannel {
    channel: Arc<RTCDataChannel>,
    open: watch::Receiver<bool>,
}

#[async_trait]
impl ControlChannel for WebRtcControlChannel {
    fn label(&self) -> String {
        self.channel.label().to_string()
    }

    async fn wait_open(&self) {
        let mut open = self.open.clone();
        while !*open.borrow_and_update() {
            if open.changed().await.is_err() {
                break;
            }
        }
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.channel
            .send_text(text)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::ControlChannel(e.to_string()))
    }
}
