use async_trait::async_trait;
use meshcall_protocol::{IceCandidateData, ParticipantId, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::ConnectionError;
use crate::media::{MediaTrack, RemoteTrack};

/// Handle to one track attached to a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SenderId(String);

impl SenderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Something the underlying connection observed on its own
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    LocalCandidate(IceCandidateData),
    TransportStateChanged(TransportState),
    RemoteTrack(RemoteTrack),
}

pub type ConnectionEventSender = mpsc::UnboundedSender<(ParticipantId, ConnectionEvent)>;
pub type ConnectionEventReceiver = mpsc::UnboundedReceiver<(ParticipantId, ConnectionEvent)>;

/// Where a connection reports its events, tagged with the peer it belongs to
#[derive(Debug, Clone)]
pub struct PeerEvents {
    peer_id: ParticipantId,
    tx: ConnectionEventSender,
}

impl PeerEvents {
    pub fn new(peer_id: ParticipantId, tx: ConnectionEventSender) -> Self {
        Self { peer_id, tx }
    }

    pub fn peer_id(&self) -> &ParticipantId {
        &self.peer_id
    }

    pub fn emit(&self, event: ConnectionEvent) {
        if self.tx.send((self.peer_id.clone(), event)).is_err() {
            tracing::debug!("Event pump gone, dropping event for {}", self.peer_id);
        }
    }
}

/// Media connection to a single remote participant
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, ConnectionError>;

    async fn create_answer(&self) -> Result<SessionDescription, ConnectionError>;

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), ConnectionError>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), ConnectionError>;

    async fn add_ice_candidate(&self, candidate: IceCandidateData) -> Result<(), ConnectionError>;

    async fn add_track(&self, track: &MediaTrack) -> Result<SenderId, ConnectionError>;

    async fn remove_sender(&self, sender: &SenderId) -> Result<(), ConnectionError>;

    async fn close(&self) -> Result<(), ConnectionError>;
}

#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(&self, events: PeerEvents) -> Result<Arc<dyn PeerConnection>, ConnectionError>;
}
