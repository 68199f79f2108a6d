use meshcall_protocol::{
    IceCandidateData, ParticipantId, SessionDescription, SignalEnvelope, SignalPayload,
};
use std::sync::Arc;

use super::connection::{PeerConnection, SenderId, TransportState};
use crate::error::ConnectionError;
use crate::media::{MediaTrack, RemoteStream, RemoteTrack, TrackKind, TrackSource};
use crate::network::SignalSender;

/// Consecutive negotiation failures after which a link gives up
pub const MAX_NEGOTIATION_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    New,
    Negotiating,
    Connected,
    Closed,
}

struct LocalSender {
    id: SenderId,
    kind: TrackKind,
    source: TrackSource,
}

/// Negotiation state with one remote participant.
///
/// Every method is a transition driven by the manager: a signal from the
/// peer, an event from the connection, or a change of local tracks. Nothing
/// leaves `Closed` and a closed link ignores all input.
pub struct PeerLink {
    local_id: ParticipantId,
    peer_id: ParticipantId,
    connection: Arc<dyn PeerConnection>,
    signals: SignalSender,
    state: LinkState,
    presenting: bool,
    remote_stream: RemoteStream,
    senders: Vec<LocalSender>,
    pending_candidates: Vec<IceCandidateData>,
    remote_description_set: bool,
    transport_connected: bool,
    awaiting_answer: bool,
    renegotiation_pending: bool,
    negotiation_failures: u32,
}

impl PeerLink {
    pub fn new(
        local_id: ParticipantId,
        peer_id: ParticipantId,
        connection: Arc<dyn PeerConnection>,
        signals: SignalSender,
    ) -> Self {
        Self {
            local_id,
            peer_id,
            connection,
            signals,
            state: LinkState::New,
            presenting: false,
            remote_stream: RemoteStream::new(),
            senders: Vec::new(),
            pending_candidates: Vec::new(),
            remote_description_set: false,
            transport_connected: false,
            awaiting_answer: false,
            renegotiation_pending: false,
            negotiation_failures: 0,
        }
    }

    pub fn peer_id(&self) -> &ParticipantId {
        &self.peer_id
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == LinkState::Closed
    }

    pub fn is_presenting(&self) -> bool {
        self.presenting
    }

    pub fn remote_stream(&self) -> RemoteStream {
        self.remote_stream.clone()
    }

    pub fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn set_presenting(&mut self, presenting: bool) {
        if self.is_closed() {
            return;
        }
        self.presenting = presenting;
    }

    /// The smaller id makes every offer on a link. The other side asks for
    /// one with `NegotiationNeeded` and only ever answers, so offers never
    /// cross and no side has to roll back.
    fn is_offerer(&self) -> bool {
        self.local_id < self.peer_id
    }

    pub async fn attach_tracks(&mut self, tracks: &[MediaTrack]) -> Result<(), ConnectionError> {
        for track in tracks {
            let id = self.connection.add_track(track).await?;
            self.senders.push(LocalSender {
                id,
                kind: track.kind(),
                source: track.source(),
            });
        }
        Ok(())
    }

    /// Swap every sender captured from one of `sources` for `tracks`.
    /// Callers follow up with [`PeerLink::negotiation_needed`].
    pub async fn replace_tracks(
        &mut self,
        sources: &[TrackSource],
        tracks: &[MediaTrack],
    ) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Ok(());
        }

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.senders)
            .into_iter()
            .partition(|s| sources.contains(&s.source));
        self.senders = kept;

        for sender in removed {
            if let Err(e) = self.connection.remove_sender(&sender.id).await {
                tracing::warn!(
                    "Failed to remove {} sender for {}: {}",
                    sender.kind,
                    self.peer_id,
                    e
                );
            }
        }

        self.attach_tracks(tracks).await
    }

    pub async fn negotiation_needed(&mut self) {
        match self.state {
            LinkState::Closed => {}
            LinkState::Negotiating => {
                tracing::debug!(
                    "Negotiation with {} in progress, renegotiating once connected",
                    self.peer_id
                );
                self.renegotiation_pending = true;
            }
            LinkState::New | LinkState::Connected => {
                if let Err(e) = self.start_negotiation().await {
                    self.negotiation_failed(e).await;
                }
            }
        }
    }

    async fn start_negotiation(&mut self) -> Result<(), ConnectionError> {
        if self.is_offerer() {
            return self.send_offer().await;
        }

        self.state = LinkState::Negotiating;
        self.emit(SignalPayload::NegotiationNeeded);
        tracing::debug!("Asked {} for an offer", self.peer_id);
        Ok(())
    }

    async fn send_offer(&mut self) -> Result<(), ConnectionError> {
        let offer = self.connection.create_offer().await?;
        self.connection.set_local_description(offer.clone()).await?;
        self.awaiting_answer = true;
        self.state = LinkState::Negotiating;
        self.emit(SignalPayload::Offer(offer));
        tracing::debug!("Sent offer to {}", self.peer_id);
        Ok(())
    }

    /// The peer changed its tracks and wants us to offer
    pub async fn handle_negotiation_request(&mut self) {
        if self.is_closed() {
            return;
        }

        if !self.is_offerer() {
            tracing::warn!(
                "Ignoring negotiation request from {}, it holds the offering role",
                self.peer_id
            );
            return;
        }

        self.negotiation_needed().await;
    }

    pub async fn handle_offer(&mut self, offer: SessionDescription) {
        if self.is_closed() {
            return;
        }

        // Only reachable if the peer offered out of turn
        if self.awaiting_answer {
            tracing::warn!("Offer from {} crossed our own, keeping ours", self.peer_id);
            return;
        }

        if let Err(e) = self.answer_offer(offer).await {
            self.negotiation_failed(e).await;
        }
    }

    async fn answer_offer(&mut self, offer: SessionDescription) -> Result<(), ConnectionError> {
        self.state = LinkState::Negotiating;

        self.connection.set_remote_description(offer).await?;
        self.remote_description_set = true;
        self.flush_candidates().await;

        let answer = self.connection.create_answer().await?;
        self.connection.set_local_description(answer.clone()).await?;
        self.emit(SignalPayload::Answer(answer));
        tracing::debug!("Sent answer to {}", self.peer_id);

        if self.transport_connected {
            self.become_connected().await;
        }
        Ok(())
    }

    pub async fn handle_answer(&mut self, answer: SessionDescription) {
        if self.is_closed() {
            return;
        }

        if !self.awaiting_answer {
            tracing::warn!("Ignoring answer from {}, no offer outstanding", self.peer_id);
            return;
        }

        match self.connection.set_remote_description(answer).await {
            Ok(()) => {
                self.awaiting_answer = false;
                self.remote_description_set = true;
                self.negotiation_failures = 0;
                self.flush_candidates().await;
                if self.transport_connected {
                    self.become_connected().await;
                }
            }
            Err(e) => self.negotiation_failed(e).await,
        }
    }

    pub async fn handle_candidate(&mut self, candidate: IceCandidateData) {
        if self.is_closed() {
            return;
        }

        if !self.remote_description_set {
            tracing::debug!("Buffering ICE candidate from {}", self.peer_id);
            self.pending_candidates.push(candidate);
            return;
        }

        self.apply_candidate(candidate).await;
    }

    async fn apply_candidate(&self, candidate: IceCandidateData) {
        if let Err(e) = self.connection.add_ice_candidate(candidate).await {
            tracing::warn!("Failed to add ICE candidate from {}: {}", self.peer_id, e);
        }
    }

    async fn flush_candidates(&mut self) {
        for candidate in std::mem::take(&mut self.pending_candidates) {
            self.apply_candidate(candidate).await;
        }
    }

    pub fn send_local_candidate(&self, candidate: IceCandidateData) {
        if self.is_closed() {
            return;
        }
        self.emit(SignalPayload::IceCandidate(candidate));
    }

    pub async fn transport_state_changed(&mut self, state: TransportState) {
        if self.is_closed() {
            return;
        }

        match state {
            TransportState::Connected => {
                self.transport_connected = true;
                if self.state == LinkState::Negotiating && !self.awaiting_answer {
                    self.become_connected().await;
                }
            }
            TransportState::Disconnected => {
                tracing::debug!("Transport to {} interrupted", self.peer_id);
            }
            TransportState::Failed | TransportState::Closed => {
                tracing::warn!("Transport to {} is {:?}, closing link", self.peer_id, state);
                self.transport_connected = false;
                self.close().await;
            }
            TransportState::New | TransportState::Connecting => {}
        }
    }

    async fn become_connected(&mut self) {
        self.state = LinkState::Connected;
        self.negotiation_failures = 0;
        tracing::info!("Link to {} connected", self.peer_id);

        if std::mem::take(&mut self.renegotiation_pending) {
            self.negotiation_needed().await;
        }
    }

    async fn negotiation_failed(&mut self, mut error: ConnectionError) {
        loop {
            self.negotiation_failures += 1;
            tracing::warn!(
                "Negotiation with {} failed ({}/{}): {}",
                self.peer_id,
                self.negotiation_failures,
                MAX_NEGOTIATION_FAILURES,
                error
            );

            if self.negotiation_failures >= MAX_NEGOTIATION_FAILURES {
                self.close().await;
                return;
            }

            match self.start_negotiation().await {
                Ok(()) => return,
                Err(e) => error = e,
            }
        }
    }

    pub async fn remote_track_added(&mut self, track: RemoteTrack) {
        if self.is_closed() {
            return;
        }
        tracing::debug!("Received {} track {} from {}", track.kind, track.id, self.peer_id);
        self.remote_stream.add_track(track).await;
    }

    pub async fn close(&mut self) {
        if self.is_closed() {
            return;
        }

        self.state = LinkState::Closed;
        self.presenting = false;
        self.awaiting_answer = false;
        self.pending_candidates.clear();
        self.senders.clear();

        if let Err(e) = self.connection.close().await {
            tracing::warn!("Error closing connection to {}: {}", self.peer_id, e);
        }
        tracing::info!("Link to {} closed", self.peer_id);
    }

    fn emit(&self, payload: SignalPayload) {
        let name = payload.name();
        let envelope = SignalEnvelope::to(self.peer_id.clone(), payload);
        if self.signals.send(envelope).is_err() {
            tracing::debug!("Signaling closed, dropping {} for {}", name, self.peer_id);
        }
    }
}
