//! In-memory [`MediaTransport`] for tests.
//!
//! Sessions record what the relay does to them and let tests inject engine
//! events (track arrival, connectivity changes) the way a real engine would.

use crate::error::{TrackReadError, TransportError};
use crate::transport::{
    ConnectivityState, ControlChannel, InboundTrack, MediaSession, MediaTransport, OutboundSink,
    ProvisionedSession, RtpPacket, SessionEvent, SESSION_EVENT_CAPACITY,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use voxrelay_types::{IceCandidate, IceServer, SdpType, SessionDescription};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Transport whose sessions live entirely in memory.
#[derive(Default)]
pub struct MemoryTransport {
    sessions: Mutex<Vec<Arc<MemorySession>>>,
    fail_sessions: AtomicBool,
    fail_sinks: AtomicBool,
    fail_control: AtomicBool,
    close_delay: Mutex<Option<Duration>>,
    created: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every subsequent `create_session` fail.
    pub fn fail_sessions(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }

    /// Makes sink creation fail on sessions created from now on.
    pub fn fail_sinks(&self, fail: bool) {
        self.fail_sinks.store(fail, Ordering::SeqCst);
    }

    /// Makes control channel creation fail on sessions created from now on.
    pub fn fail_control(&self, fail: bool) {
        self.fail_control.store(fail, Ordering::SeqCst);
    }

    /// Makes `close` on sessions created from now on wait `delay` before
    /// the session counts as closed.
    pub fn close_delay(&self, delay: Duration) {
        *lock(&self.close_delay) = Some(delay);
    }

    pub fn sessions(&self) -> Vec<Arc<MemorySession>> {
        lock(&self.sessions).clone()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn session(&self, id: &str) -> Option<Arc<MemorySession>> {
        lock(&self.sessions).iter().find(|s| s.id == id).cloned()
    }
}

#[async_trait]
impl MediaTransport for MemoryTransport {
    async fn create_session(
        &self,
        ice_servers: &[IceServer],
    ) -> Result<ProvisionedSession, TransportError> {
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(TransportError::SessionCreation(
                "memory transport refused session".to_string(),
            ));
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        let (events_tx, events_rx) = mpsc::channel(SESSION_EVENT_CAPACITY);
        let session = Arc::new(MemorySession {
            id: format!("mem-{}", n),
            ice_servers: ice_servers.to_vec(),
            events: events_tx,
            fail_sink: self.fail_sinks.load(Ordering::SeqCst),
            fail_control: self.fail_control.load(Ordering::SeqCst),
            close_delay: *lock(&self.close_delay),
            state: Mutex::new(SessionState::default()),
            gathering_stalled: AtomicBool::new(false),
        });
        lock(&self.sessions).push(session.clone());
        Ok(ProvisionedSession {
            session,
            events: events_rx,
        })
    }
}

#[derive(Default)]
struct SessionState {
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    candidates: Vec<IceCandidate>,
    sink: Option<Arc<RecordingSink>>,
    control: Option<Arc<MemoryControlChannel>>,
    closed: bool,
}

/// A session that records negotiation and lets tests drive engine events.
pub struct MemorySession {
    id: String,
    ice_servers: Vec<IceServer>,
    events: mpsc::Sender<SessionEvent>,
    fail_sink: bool,
    fail_control: bool,
    close_delay: Option<Duration>,
    state: Mutex<SessionState>,
    gathering_stalled: AtomicBool,
}

impl MemorySession {
    pub fn session_id(&self) -> &str {
        &self.id
    }

    pub fn ice_servers(&self) -> &[IceServer] {
        &self.ice_servers
    }

    /// The sink handed to the relay.
    pub fn sink(&self) -> Option<Arc<RecordingSink>> {
        lock(&self.state).sink.clone()
    }

    pub fn control(&self) -> Option<Arc<MemoryControlChannel>> {
        lock(&self.state).control.clone()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        lock(&self.state).candidates.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        lock(&self.state).remote.clone()
    }

    /// Makes `gathering_complete` never resolve.
    pub fn stall_gathering(&self) {
        self.gathering_stalled.store(true, Ordering::SeqCst);
    }

    /// Simulates the remote side's audio track arriving.
    pub async fn push_track(&self) -> Arc<ScriptedTrack> {
        let track = Arc::new(ScriptedTrack::new(format!("{}-track", self.id)));
        let _ = self
            .events
            .send(SessionEvent::TrackArrived(track.clone()))
            .await;
        track
    }

    /// Simulates an ICE connectivity change.
    pub async fn set_connectivity(&self, state: ConnectivityState) {
        let _ = self
            .events
            .send(SessionEvent::ConnectivityChanged(state))
            .await;
    }
}

#[async_trait]
impl MediaSession for MemorySession {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn add_outbound_audio_sink(&self) -> Result<Arc<dyn OutboundSink>, TransportError> {
        if self.fail_sink {
            return Err(TransportError::Sink("memory sink refused".to_string()));
        }
        let sink = Arc::new(RecordingSink::default());
        lock(&self.state).sink = Some(sink.clone());
        Ok(sink)
    }

    async fn create_control_channel(
        &self,
        label: &str,
    ) -> Result<Arc<dyn ControlChannel>, TransportError> {
        if self.fail_control {
            return Err(TransportError::ControlChannel(
                "memory control channel refused".to_string(),
            ));
        }
        let channel = Arc::new(MemoryControlChannel::new(label));
        lock(&self.state).control = Some(channel.clone());
        Ok(channel)
    }

    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        Ok(SessionDescription::offer(format!("v=0\r\no=- {} offer\r\n", self.id)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let state = lock(&self.state);
        match &state.remote {
            Some(remote) if remote.sdp_type == SdpType::Offer => Ok(SessionDescription::answer(
                format!("v=0\r\no=- {} answer\r\n", self.id),
            )),
            _ => Err(TransportError::Negotiation(
                "no remote offer to answer".to_string(),
            )),
        }
    }

    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError> {
        lock(&self.state).local = Some(desc);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError> {
        if desc.sdp.trim().is_empty() {
            return Err(TransportError::Negotiation("empty SDP".to_string()));
        }
        lock(&self.state).remote = Some(desc);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        lock(&self.state).local.clone().map(|mut desc| {
            desc.sdp.push_str("a=end-of-candidates\r\n");
            desc
        })
    }

    async fn gathering_complete(&self) {
        if self.gathering_stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if state.remote.is_none() {
            return Err(TransportError::Candidate(
                "remote description not set".to_string(),
            ));
        }
        state.candidates.push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Some(delay) = self.close_delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.state).closed = true;
        Ok(())
    }
}

/// An inbound track fed by the test.
pub struct ScriptedTrack {
    id: String,
    tx: mpsc::UnboundedSender<Result<RtpPacket, TrackReadError>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<RtpPacket, TrackReadError>>>,
}

impl ScriptedTrack {
    fn new(id: String) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            id,
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    pub fn send(&self, packet: impl Into<RtpPacket>) {
        let _ = self.tx.send(Ok(packet.into()));
    }

    pub fn fail(&self, message: &str) {
        let _ = self.tx.send(Err(TrackReadError::Read(message.to_string())));
    }

    pub fn finish(&self) {
        let _ = self.tx.send(Err(TrackReadError::EndOfStream));
    }
}

#[async_trait]
impl InboundTrack for ScriptedTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn read_packet(&self) -> Result<RtpPacket, TrackReadError> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(item) => item,
            None => Err(TrackReadError::EndOfStream),
        }
    }
}

/// Outbound sink that records every packet written to it.
#[derive(Default)]
pub struct RecordingSink {
    written: Mutex<Vec<RtpPacket>>,
    failing: AtomicBool,
    notify: tokio::sync::Notify,
}

impl RecordingSink {
    pub fn written(&self) -> Vec<RtpPacket> {
        lock(&self.written).clone()
    }

    pub fn write_count(&self) -> usize {
        lock(&self.written).len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Waits until at least `count` packets have been written.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.write_count() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl OutboundSink for RecordingSink {
    async fn write_packet(&self, packet: &RtpPacket) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Write("sink is failing".to_string()));
        }
        lock(&self.written).push(packet.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Control channel that is open immediately and records sent messages.
pub struct MemoryControlChannel {
    label: String,
    sent: Mutex<Vec<String>>,
    notify: tokio::sync::Notify,
}

impl MemoryControlChannel {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            sent: Mutex::new(Vec::new()),
            notify: tokio::sync::Notify::new(),
        }
    }

    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    /// Waits until at least `count` messages have been sent.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if lock(&self.sent).len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl ControlChannel for MemoryControlChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn wait_open(&self) {}

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        lock(&self.sent).push(text);
        self.notify.notify_waiters();
        Ok(())
    }
}
