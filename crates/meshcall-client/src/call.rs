use anyhow::Result;
use meshcall_protocol::ParticipantId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::media::{MediaDevices, MediaTrackCoordinator, Renderer};
use crate::network::{SignalReceiver, SignalingClient};
use crate::peer::{
    ConnectionEventReceiver, ConnectionFactory, PeerConnectionManager, RtcConnectionFactory,
};

/// A joined session: signaling, peer links and local media wired together
pub struct Call {
    signaling: SignalingClient,
    peers: PeerConnectionManager,
    media: Arc<MediaTrackCoordinator>,
    pump: JoinHandle<()>,
}

impl Call {
    /// Join using WebRTC connections configured from `config`
    pub async fn join(
        config: &ClientConfig,
        devices: Arc<dyn MediaDevices>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self> {
        let factory = Arc::new(RtcConnectionFactory::new(config.ice_servers.clone())?);
        Self::join_with(config, devices, renderer, factory).await
    }

    pub async fn join_with(
        config: &ClientConfig,
        devices: Arc<dyn MediaDevices>,
        renderer: Arc<dyn Renderer>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<Self> {
        let (signaling, inbound) = SignalingClient::connect(config).await?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let peers = PeerConnectionManager::new(
            signaling.participant_id().clone(),
            factory,
            renderer,
            signaling.signal_sender(),
            events_tx,
        );
        let media = Arc::new(MediaTrackCoordinator::new(
            devices,
            peers.clone(),
            signaling.signal_sender(),
        ));

        // Local tracks first, so links created for early joiners carry them
        media.start().await?;

        let pump = tokio::spawn(run_event_pump(peers.clone(), inbound, events_rx));
        signaling.request_join();

        tracing::info!(
            "Joined room {} as {}",
            config.room_id,
            signaling.participant_id()
        );

        Ok(Self {
            signaling,
            peers,
            media,
            pump,
        })
    }

    pub fn participant_id(&self) -> &ParticipantId {
        self.signaling.participant_id()
    }

    pub fn peers(&self) -> &PeerConnectionManager {
        &self.peers
    }

    pub fn media(&self) -> Arc<MediaTrackCoordinator> {
        self.media.clone()
    }

    /// Close every link and the signaling connection
    pub async fn leave(self) {
        self.pump.abort();
        self.peers.leave().await;
        tracing::info!("Left call as {}", self.signaling.participant_id());
    }
}

/// Handles inbound signals and connection events one at a time, each to
/// completion before the next
async fn run_event_pump(
    peers: PeerConnectionManager,
    mut inbound: SignalReceiver,
    mut events: ConnectionEventReceiver,
) {
    loop {
        tokio::select! {
            envelope = inbound.recv() => match envelope {
                Some(envelope) => peers.dispatch(envelope).await,
                None => {
                    tracing::warn!("Signaling connection lost, closing all links");
                    peers.leave().await;
                    break;
                }
            },
            Some((peer_id, event)) = events.recv() => {
                peers.handle_connection_event(&peer_id, event).await;
            }
        }
    }
}
