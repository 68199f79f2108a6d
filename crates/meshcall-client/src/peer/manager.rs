use meshcall_protocol::{ParticipantId, SignalEnvelope, SignalPayload};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::connection::{ConnectionEvent, ConnectionEventSender, ConnectionFactory, PeerEvents};
use super::link::{LinkState, PeerLink};
use crate::media::{MediaTrack, RemoteStream, Renderer, TrackSource};
use crate::network::SignalSender;

/// Live links keyed by remote participant, plus the local tracks every new
/// link starts out with
#[derive(Default)]
pub struct PeerRegistry {
    links: HashMap<ParticipantId, PeerLink>,
    local_tracks: Vec<MediaTrack>,
}

impl PeerRegistry {
    pub fn get(&self, peer_id: &ParticipantId) -> Option<&PeerLink> {
        self.links.get(peer_id)
    }

    pub fn get_mut(&mut self, peer_id: &ParticipantId) -> Option<&mut PeerLink> {
        self.links.get_mut(peer_id)
    }

    pub fn contains(&self, peer_id: &ParticipantId) -> bool {
        self.links.contains_key(peer_id)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn links(&self) -> impl Iterator<Item = &PeerLink> {
        self.links.values()
    }

    fn links_mut(&mut self) -> impl Iterator<Item = &mut PeerLink> {
        self.links.values_mut()
    }

    fn insert(&mut self, link: PeerLink) {
        self.links.insert(link.peer_id().clone(), link);
    }

    pub fn local_tracks(&self) -> &[MediaTrack] {
        &self.local_tracks
    }

    fn replace_local_tracks(&mut self, sources: &[TrackSource], tracks: &[MediaTrack]) {
        self.local_tracks.retain(|t| !sources.contains(&t.source()));
        self.local_tracks.extend_from_slice(tracks);
    }

    pub fn presenting_peer(&self) -> Option<&ParticipantId> {
        self.links
            .values()
            .find(|link| link.is_presenting())
            .map(PeerLink::peer_id)
    }

    fn take_closed(&mut self) -> Vec<ParticipantId> {
        let closed: Vec<_> = self
            .links
            .values()
            .filter(|link| link.is_closed())
            .map(|link| link.peer_id().clone())
            .collect();
        for id in &closed {
            self.links.remove(id);
        }
        closed
    }
}

/// Snapshot of one remote participant as seen locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantView {
    pub id: ParticipantId,
    pub state: LinkState,
    pub presenting: bool,
}

/// Routes signals and connection events to the right [`PeerLink`]
#[derive(Clone)]
pub struct PeerConnectionManager {
    local_id: ParticipantId,
    registry: Arc<Mutex<PeerRegistry>>,
    factory: Arc<dyn ConnectionFactory>,
    renderer: Arc<dyn Renderer>,
    signals: SignalSender,
    events: ConnectionEventSender,
}

impl PeerConnectionManager {
    pub fn new(
        local_id: ParticipantId,
        factory: Arc<dyn ConnectionFactory>,
        renderer: Arc<dyn Renderer>,
        signals: SignalSender,
        events: ConnectionEventSender,
    ) -> Self {
        Self {
            local_id,
            registry: Arc::new(Mutex::new(PeerRegistry::default())),
            factory,
            renderer,
            signals,
            events,
        }
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    /// Handle one envelope from the relay
    pub async fn dispatch(&self, envelope: SignalEnvelope) {
        let Some(sender) = envelope.sender else {
            tracing::warn!("Dropping {} without a sender", envelope.payload.name());
            return;
        };
        if sender == self.local_id {
            tracing::debug!("Ignoring {} from ourselves", envelope.payload.name());
            return;
        }

        let mut registry = self.registry.lock().await;

        match envelope.payload {
            SignalPayload::Joined => {
                if registry.contains(&sender) {
                    tracing::debug!("Participant {} already linked", sender);
                } else if let Some(link) = self.create_link(&mut registry, &sender).await {
                    link.negotiation_needed().await;
                }
            }
            SignalPayload::Offer(offer) => {
                if let Some(link) = self.get_or_create(&mut registry, &sender).await {
                    link.handle_offer(offer).await;
                }
            }
            SignalPayload::Answer(answer) => match registry.get_mut(&sender) {
                Some(link) => link.handle_answer(answer).await,
                None => tracing::warn!("Dropping answer from unknown participant {}", sender),
            },
            SignalPayload::IceCandidate(candidate) => {
                if let Some(link) = self.get_or_create(&mut registry, &sender).await {
                    link.handle_candidate(candidate).await;
                }
            }
            SignalPayload::Presenting(presenting) => {
                if let Some(link) = self.get_or_create(&mut registry, &sender).await {
                    link.set_presenting(presenting);
                    tracing::info!("Participant {} presenting: {}", sender, presenting);
                }
            }
            SignalPayload::NegotiationNeeded => {
                if let Some(link) = self.get_or_create(&mut registry, &sender).await {
                    link.handle_negotiation_request().await;
                }
            }
            SignalPayload::Disconnected => match registry.get_mut(&sender) {
                Some(link) => {
                    tracing::info!("Participant {} left", sender);
                    link.close().await;
                }
                None => tracing::debug!("Disconnect from unknown participant {}", sender),
            },
        }

        self.reap_closed(&mut registry);
    }

    /// Handle something a connection reported
    pub async fn handle_connection_event(&self, peer_id: &ParticipantId, event: ConnectionEvent) {
        let mut registry = self.registry.lock().await;

        let Some(link) = registry.get_mut(peer_id) else {
            tracing::debug!("Dropping connection event for unknown participant {}", peer_id);
            return;
        };

        match event {
            ConnectionEvent::LocalCandidate(candidate) => link.send_local_candidate(candidate),
            ConnectionEvent::TransportStateChanged(state) => {
                link.transport_state_changed(state).await
            }
            ConnectionEvent::RemoteTrack(track) => link.remote_track_added(track).await,
        }

        self.reap_closed(&mut registry);
    }

    /// Replace the local tracks captured from `sources` on every link and
    /// renegotiate
    pub async fn broadcast_local_tracks(&self, sources: &[TrackSource], tracks: &[MediaTrack]) {
        let mut registry = self.registry.lock().await;
        registry.replace_local_tracks(sources, tracks);

        for link in registry.links_mut() {
            if let Err(e) = link.replace_tracks(sources, tracks).await {
                tracing::warn!("Failed to replace tracks for {}: {}", link.peer_id(), e);
            }
            link.negotiation_needed().await;
        }

        self.reap_closed(&mut registry);
    }

    /// Close every link
    pub async fn leave(&self) {
        let mut registry = self.registry.lock().await;
        for link in registry.links_mut() {
            link.close().await;
        }
        self.reap_closed(&mut registry);
    }

    pub async fn link_state(&self, peer_id: &ParticipantId) -> Option<LinkState> {
        self.registry.lock().await.get(peer_id).map(PeerLink::state)
    }

    pub async fn remote_stream(&self, peer_id: &ParticipantId) -> Option<RemoteStream> {
        self.registry
            .lock()
            .await
            .get(peer_id)
            .map(PeerLink::remote_stream)
    }

    pub async fn pending_candidate_count(&self, peer_id: &ParticipantId) -> Option<usize> {
        self.registry
            .lock()
            .await
            .get(peer_id)
            .map(PeerLink::pending_candidate_count)
    }

    pub async fn participant_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    pub async fn participants(&self) -> Vec<ParticipantView> {
        let registry = self.registry.lock().await;
        let mut views: Vec<_> = registry
            .links()
            .map(|link| ParticipantView {
                id: link.peer_id().clone(),
                state: link.state(),
                presenting: link.is_presenting(),
            })
            .collect();
        views.sort_by(|a, b| a.id.cmp(&b.id));
        views
    }

    /// Remote participant flagged as presenting in the local view, if any
    pub async fn presenting_peer(&self) -> Option<ParticipantId> {
        self.registry.lock().await.presenting_peer().cloned()
    }

    async fn get_or_create<'a>(
        &self,
        registry: &'a mut PeerRegistry,
        peer_id: &ParticipantId,
    ) -> Option<&'a mut PeerLink> {
        if registry.contains(peer_id) {
            return registry.get_mut(peer_id);
        }
        self.create_link(registry, peer_id).await
    }

    async fn create_link<'a>(
        &self,
        registry: &'a mut PeerRegistry,
        peer_id: &ParticipantId,
    ) -> Option<&'a mut PeerLink> {
        let events = PeerEvents::new(peer_id.clone(), self.events.clone());
        let connection = match self.factory.create(events).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!("Failed to create connection for {}: {}", peer_id, e);
                return None;
            }
        };

        let mut link = PeerLink::new(
            self.local_id.clone(),
            peer_id.clone(),
            connection,
            self.signals.clone(),
        );
        if let Err(e) = link.attach_tracks(registry.local_tracks()).await {
            tracing::warn!("Failed to attach local tracks for {}: {}", peer_id, e);
            link.close().await;
            return None;
        }

        self.renderer
            .render_remote_stream(peer_id, link.remote_stream());
        registry.insert(link);
        self.renderer.recompute_layout(registry.len() + 1);

        tracing::info!("Created link to {}", peer_id);
        registry.get_mut(peer_id)
    }

    fn reap_closed(&self, registry: &mut PeerRegistry) {
        let closed = registry.take_closed();
        if closed.is_empty() {
            return;
        }

        for peer_id in &closed {
            self.renderer.remove_rendered_stream(peer_id);
        }
        self.renderer.recompute_layout(registry.len() + 1);
    }
}
