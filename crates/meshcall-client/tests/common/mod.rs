//! In-memory collaborators for driving several participants in one test

#![allow(dead_code)]

use async_trait::async_trait;
use meshcall_client::error::{ConnectionError, MediaError};
use meshcall_client::media::{
    DeviceInfo, DisplayConstraints, MediaDevices, MediaStream, MediaTrack,
    MediaTrackCoordinator, RemoteStream, RemoteTrack, Renderer, StreamConstraints, TrackKind,
    TrackSource,
};
use meshcall_client::network::SignalReceiver;
use meshcall_client::peer::{
    ConnectionEvent, ConnectionEventReceiver, ConnectionFactory, LinkState, PeerConnection,
    PeerConnectionManager, PeerEvents, SenderId, TransportState,
};
use meshcall_protocol::{
    IceCandidateData, ParticipantId, SdpType, SessionDescription, SignalEnvelope, SignalPayload,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// ============================================================================
// Connection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
}

struct FakeState {
    signaling: SignalingState,
    has_remote_description: bool,
    transport_connected: bool,
    candidate_sent: bool,
    applied_candidates: Vec<IceCandidateData>,
    senders: Vec<(SenderId, TrackKind)>,
    next_sender: u32,
    offers_created: u32,
    answers_to_reject: u32,
    closed: bool,
}

/// Connection with the signaling states of the WebRTC backend and an
/// instant transport. Like the backend it cannot roll back a local offer.
pub struct FakeConnection {
    events: PeerEvents,
    state: Mutex<FakeState>,
}

impl FakeConnection {
    fn new(events: PeerEvents) -> Self {
        Self {
            events,
            state: Mutex::new(FakeState {
                signaling: SignalingState::Stable,
                has_remote_description: false,
                transport_connected: false,
                candidate_sent: false,
                applied_candidates: Vec::new(),
                senders: Vec::new(),
                next_sender: 0,
                offers_created: 0,
                answers_to_reject: 0,
                closed: false,
            }),
        }
    }

    pub fn offers_created(&self) -> u32 {
        self.state.lock().unwrap().offers_created
    }

    pub fn applied_candidates(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .applied_candidates
            .iter()
            .map(|c| c.candidate.clone())
            .collect()
    }

    pub fn senders(&self) -> Vec<(SenderId, TrackKind)> {
        self.state.lock().unwrap().senders.clone()
    }

    pub fn senders_of(&self, kind: TrackKind) -> Vec<SenderId> {
        self.senders()
            .into_iter()
            .filter(|(_, k)| *k == kind)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn reject_next_answers(&self, count: u32) {
        self.state.lock().unwrap().answers_to_reject = count;
    }

    pub fn fail_transport(&self) {
        self.events
            .emit(ConnectionEvent::TransportStateChanged(TransportState::Failed));
    }

    pub fn deliver_remote_track(&self, id: &str, kind: TrackKind) {
        self.events
            .emit(ConnectionEvent::RemoteTrack(RemoteTrack::new(id, kind)));
    }

    fn check_open(state: &FakeState) -> Result<(), ConnectionError> {
        if state.closed {
            return Err(ConnectionError::Negotiation("connection closed".to_string()));
        }
        Ok(())
    }

    fn invalid(what: &str, state: SignalingState) -> ConnectionError {
        ConnectionError::Negotiation(format!("cannot apply {} in {:?}", what, state))
    }

    /// Gathering starts with the first local description
    fn gather(&self, state: &mut FakeState) {
        if !state.candidate_sent {
            state.candidate_sent = true;
            self.events.emit(ConnectionEvent::LocalCandidate(IceCandidateData {
                candidate: format!("candidate:{}", self.events.peer_id()),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
                username_fragment: None,
            }));
        }
    }

    fn negotiated(&self, state: &mut FakeState) {
        if !state.transport_connected {
            state.transport_connected = true;
            self.events
                .emit(ConnectionEvent::TransportStateChanged(TransportState::Connected));
        }
    }
}

#[async_trait]
impl PeerConnection for FakeConnection {
    async fn create_offer(&self) -> Result<SessionDescription, ConnectionError> {
        let mut state = self.state.lock().unwrap();
        Self::check_open(&state)?;
        state.offers_created += 1;
        Ok(SessionDescription::offer(format!(
            "offer-{}-{}",
            self.events.peer_id(),
            state.offers_created
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription, ConnectionError> {
        let state = self.state.lock().unwrap();
        Self::check_open(&state)?;
        if state.signaling != SignalingState::HaveRemoteOffer {
            return Err(Self::invalid("answer creation", state.signaling));
        }
        Ok(SessionDescription::answer(format!("answer-{}", self.events.peer_id())))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), ConnectionError> {
        let mut state = self.state.lock().unwrap();
        Self::check_open(&state)?;
        match (description.sdp_type, state.signaling) {
            (SdpType::Offer, SignalingState::Stable | SignalingState::HaveLocalOffer) => {
                state.signaling = SignalingState::HaveLocalOffer;
            }
            (SdpType::Answer, SignalingState::HaveRemoteOffer) => {
                state.signaling = SignalingState::Stable;
                self.negotiated(&mut state);
            }
            (_, current) => return Err(Self::invalid("local description", current)),
        }
        self.gather(&mut state);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), ConnectionError> {
        let mut state = self.state.lock().unwrap();
        Self::check_open(&state)?;
        match (description.sdp_type, state.signaling) {
            (SdpType::Offer, SignalingState::Stable) => {
                state.signaling = SignalingState::HaveRemoteOffer;
            }
            (SdpType::Answer, SignalingState::HaveLocalOffer) => {
                if state.answers_to_reject > 0 {
                    state.answers_to_reject -= 1;
                    return Err(ConnectionError::Negotiation("answer rejected".to_string()));
                }
                state.signaling = SignalingState::Stable;
                self.negotiated(&mut state);
            }
            (_, current) => return Err(Self::invalid("remote description", current)),
        }
        state.has_remote_description = true;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateData) -> Result<(), ConnectionError> {
        let mut state = self.state.lock().unwrap();
        Self::check_open(&state)?;
        if !state.has_remote_description {
            return Err(ConnectionError::Negotiation(
                "candidate before remote description".to_string(),
            ));
        }
        state.applied_candidates.push(candidate);
        Ok(())
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<SenderId, ConnectionError> {
        let mut state = self.state.lock().unwrap();
        Self::check_open(&state)?;
        state.next_sender += 1;
        let id = SenderId::new(format!("sender-{}", state.next_sender));
        state.senders.push((id.clone(), track.kind()));
        Ok(id)
    }

    async fn remove_sender(&self, sender: &SenderId) -> Result<(), ConnectionError> {
        let mut state = self.state.lock().unwrap();
        state.senders.retain(|(id, _)| id != sender);
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeFactory {
    connections: Mutex<HashMap<ParticipantId, Arc<FakeConnection>>>,
    created: AtomicU32,
}

impl FakeFactory {
    pub fn connection(&self, peer: &str) -> Arc<FakeConnection> {
        self.connections
            .lock()
            .unwrap()
            .get(&ParticipantId::from(peer))
            .cloned()
            .unwrap_or_else(|| panic!("no connection to {}", peer))
    }

    pub fn created(&self) -> u32 {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    async fn create(&self, events: PeerEvents) -> Result<Arc<dyn PeerConnection>, ConnectionError> {
        let peer_id = events.peer_id().clone();
        let connection = Arc::new(FakeConnection::new(events));
        self.connections
            .lock()
            .unwrap()
            .insert(peer_id, connection.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(connection)
    }
}

// ============================================================================
// Devices and renderer
// ============================================================================

#[derive(Default)]
pub struct FakeDevices {
    devices: Vec<DeviceInfo>,
    next_failure: Mutex<Option<MediaError>>,
    counter: AtomicU32,
}

impl FakeDevices {
    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices,
            ..Default::default()
        }
    }

    pub fn fail_next(&self, error: MediaError) {
        *self.next_failure.lock().unwrap() = Some(error);
    }

    fn take_failure(&self) -> Result<(), MediaError> {
        match self.next_failure.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn track(&self, prefix: &str, kind: TrackKind, source: TrackSource, label: &str) -> MediaTrack {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        MediaTrack::new(format!("{}-{}", prefix, n), kind, source, label)
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn enumerate_capture_devices(&self) -> Result<Vec<DeviceInfo>, MediaError> {
        Ok(self.devices.clone())
    }

    async fn acquire_stream(&self, constraints: &StreamConstraints) -> Result<MediaStream, MediaError> {
        self.take_failure()?;

        let mut tracks = Vec::new();
        if let Some(audio) = &constraints.audio {
            let label = audio.device_id.as_deref().unwrap_or("default-mic");
            tracks.push(self.track("mic", TrackKind::Audio, TrackSource::Microphone, label));
        }
        if let Some(video) = &constraints.video {
            let label = video.device_id.as_deref().unwrap_or("default-cam");
            tracks.push(self.track("cam", TrackKind::Video, TrackSource::Camera, label));
        }
        Ok(MediaStream::new(tracks))
    }

    async fn acquire_display_stream(
        &self,
        constraints: &DisplayConstraints,
    ) -> Result<MediaStream, MediaError> {
        self.take_failure()?;

        let mut tracks = vec![self.track("screen", TrackKind::Video, TrackSource::Screen, "Window")];
        if constraints.audio {
            tracks.push(self.track("screen-audio", TrackKind::Audio, TrackSource::Screen, "Window"));
        }
        Ok(MediaStream::new(tracks))
    }
}

#[derive(Default)]
pub struct FakeRenderer {
    rendered: Mutex<HashSet<ParticipantId>>,
    removed: Mutex<Vec<ParticipantId>>,
    layouts: Mutex<Vec<usize>>,
}

impl FakeRenderer {
    pub fn is_rendered(&self, peer: &str) -> bool {
        self.rendered.lock().unwrap().contains(&ParticipantId::from(peer))
    }

    pub fn was_removed(&self, peer: &str) -> bool {
        self.removed.lock().unwrap().contains(&ParticipantId::from(peer))
    }

    pub fn last_layout(&self) -> Option<usize> {
        self.layouts.lock().unwrap().last().copied()
    }
}

impl Renderer for FakeRenderer {
    fn render_remote_stream(&self, peer: &ParticipantId, _stream: RemoteStream) {
        self.rendered.lock().unwrap().insert(peer.clone());
    }

    fn remove_rendered_stream(&self, peer: &ParticipantId) {
        self.rendered.lock().unwrap().remove(peer);
        self.removed.lock().unwrap().push(peer.clone());
    }

    fn recompute_layout(&self, participants: usize) {
        self.layouts.lock().unwrap().push(participants);
    }
}

// ============================================================================
// Participant
// ============================================================================

/// One client core wired to fakes, with its outbound signals captured
pub struct Participant {
    pub id: ParticipantId,
    pub peers: PeerConnectionManager,
    pub media: MediaTrackCoordinator,
    pub factory: Arc<FakeFactory>,
    pub devices: Arc<FakeDevices>,
    pub renderer: Arc<FakeRenderer>,
    outbound: SignalReceiver,
    events: ConnectionEventReceiver,
}

impl Participant {
    pub async fn new(id: &str) -> Self {
        Self::with_devices(id, Arc::new(FakeDevices::default())).await
    }

    pub async fn with_devices(id: &str, devices: Arc<FakeDevices>) -> Self {
        let id = ParticipantId::from(id);
        let factory = Arc::new(FakeFactory::default());
        let renderer = Arc::new(FakeRenderer::default());
        let (signals_tx, outbound) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();

        let peers = PeerConnectionManager::new(
            id.clone(),
            factory.clone(),
            renderer.clone(),
            signals_tx.clone(),
            events_tx,
        );
        let media = MediaTrackCoordinator::new(devices.clone(), peers.clone(), signals_tx);
        media.start().await.expect("local media");

        Self {
            id,
            peers,
            media,
            factory,
            devices,
            renderer,
            outbound,
            events,
        }
    }

    pub fn connection(&self, peer: &str) -> Arc<FakeConnection> {
        self.factory.connection(peer)
    }

    pub async fn link_state(&self, peer: &str) -> Option<LinkState> {
        self.peers.link_state(&ParticipantId::from(peer)).await
    }

    /// Deliver an envelope as if the relay stamped it with `sender`
    pub async fn receive(&self, sender: &str, payload: SignalPayload) {
        self.peers
            .dispatch(SignalEnvelope::broadcast(payload).stamped(ParticipantId::from(sender)))
            .await;
    }

    /// Feed every queued connection event to the manager
    pub async fn process_events(&mut self) -> bool {
        let mut progressed = false;
        while let Ok((peer_id, event)) = self.events.try_recv() {
            self.peers.handle_connection_event(&peer_id, event).await;
            progressed = true;
        }
        progressed
    }

    pub fn take_outbound(&mut self) -> Vec<SignalEnvelope> {
        let mut sent = Vec::new();
        while let Ok(envelope) = self.outbound.try_recv() {
            sent.push(envelope);
        }
        sent
    }
}

// ============================================================================
// Relay
// ============================================================================

/// Relay stand-in: routes captured envelopes between joined participants
#[derive(Default)]
pub struct Mesh {
    participants: Vec<Participant>,
    joined: Vec<ParticipantId>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a participant and join it to the session
    pub async fn join(&mut self, id: &str) {
        let participant = Participant::new(id).await;
        let joiner = participant.id.clone();
        self.participants.push(participant);

        for member in self.joined.clone() {
            self.deliver(&joiner, SignalEnvelope::broadcast(SignalPayload::Joined), &member)
                .await;
        }
        self.joined.push(joiner);
    }

    /// The relay noticed `id` going away
    pub async fn disconnect(&mut self, id: &str) {
        let leaver = ParticipantId::from(id);
        self.joined.retain(|member| member != &leaver);
        for member in self.joined.clone() {
            self.deliver(&leaver, SignalEnvelope::broadcast(SignalPayload::Disconnected), &member)
                .await;
        }
    }

    pub fn get(&self, id: &str) -> &Participant {
        self.participants
            .iter()
            .find(|p| p.id.as_str() == id)
            .unwrap_or_else(|| panic!("unknown participant {}", id))
    }

    /// Run events and route signals until nothing moves
    pub async fn settle(&mut self) {
        for _ in 0..1000 {
            let mut progressed = false;
            let mut in_flight = Vec::new();

            for participant in &mut self.participants {
                progressed |= participant.process_events().await;
                if !self.joined.contains(&participant.id) {
                    participant.take_outbound();
                    continue;
                }
                for envelope in participant.take_outbound() {
                    in_flight.push((participant.id.clone(), envelope));
                }
            }

            for (sender, envelope) in in_flight {
                progressed = true;
                match envelope.recipient.clone() {
                    Some(recipient) => {
                        if self.joined.contains(&recipient) {
                            self.deliver(&sender, envelope, &recipient).await;
                        }
                    }
                    None => {
                        for member in self.joined.clone() {
                            if member != sender {
                                self.deliver(&sender, envelope.clone(), &member).await;
                            }
                        }
                    }
                }
            }

            if !progressed {
                return;
            }
        }
        panic!("mesh did not settle");
    }

    async fn deliver(&self, sender: &ParticipantId, envelope: SignalEnvelope, to: &ParticipantId) {
        if let Some(target) = self.participants.iter().find(|p| &p.id == to) {
            target.peers.dispatch(envelope.stamped(sender.clone())).await;
        }
    }
}
