use async_trait::async_trait;
use meshcall_protocol::{IceCandidateData, SdpType, SessionDescription};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;

use super::connection::{
    ConnectionEvent, ConnectionFactory, PeerConnection, PeerEvents, SenderId, TransportState,
};
use crate::error::ConnectionError;
use crate::media::{MediaTrack, RemoteTrack, TrackKind};

/// Builds WebRTC peer connections sharing one configured API
pub struct RtcConnectionFactory {
    api: API,
    ice_servers: Vec<String>,
}

impl RtcConnectionFactory {
    pub fn new(ice_servers: Vec<String>) -> Result<Self, ConnectionError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api, ice_servers })
    }

    fn configuration(&self) -> RTCConfiguration {
        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ConnectionFactory for RtcConnectionFactory {
    async fn create(&self, events: PeerEvents) -> Result<Arc<dyn PeerConnection>, ConnectionError> {
        let pc = Arc::new(self.api.new_peer_connection(self.configuration()).await?);

        let candidate_events = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let events = candidate_events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(json) => events.emit(ConnectionEvent::LocalCandidate(IceCandidateData {
                        candidate: json.candidate,
                        sdp_mid: json.sdp_mid,
                        sdp_mline_index: json.sdp_mline_index,
                        username_fragment: json.username_fragment,
                    })),
                    Err(e) => tracing::warn!("Failed to serialize local candidate: {}", e),
                }
            })
        }));

        let state_events = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let events = state_events.clone();
            Box::pin(async move {
                if let Some(state) = transport_state(state) {
                    events.emit(ConnectionEvent::TransportStateChanged(state));
                }
            })
        }));

        let track_events = events;
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let events = track_events.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    _ => return,
                };
                let remote = RemoteTrack::new(track.id(), kind).with_source(track);
                events.emit(ConnectionEvent::RemoteTrack(remote));
            })
        }));

        Ok(Arc::new(RtcPeerConnection {
            pc,
            senders: Mutex::new(HashMap::new()),
        }))
    }
}

pub struct RtcPeerConnection {
    pc: Arc<RTCPeerConnection>,
    senders: Mutex<HashMap<SenderId, Arc<RTCRtpSender>>>,
}

#[async_trait]
impl PeerConnection for RtcPeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription, ConnectionError> {
        let offer = self.pc.create_offer(None).await?;
        from_rtc(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription, ConnectionError> {
        let answer = self.pc.create_answer(None).await?;
        from_rtc(answer)
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), ConnectionError> {
        self.pc.set_local_description(to_rtc(description)?).await?;
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), ConnectionError> {
        self.pc.set_remote_description(to_rtc(description)?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateData) -> Result<(), ConnectionError> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<SenderId, ConnectionError> {
        let sender = self
            .pc
            .add_track(track.sink() as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        let id = SenderId::new(Uuid::new_v4().to_string());
        self.senders.lock().await.insert(id.clone(), sender);
        Ok(id)
    }

    async fn remove_sender(&self, sender: &SenderId) -> Result<(), ConnectionError> {
        let Some(rtp_sender) = self.senders.lock().await.remove(sender) else {
            return Ok(());
        };
        self.pc.remove_track(&rtp_sender).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.pc.close().await?;
        Ok(())
    }
}

fn transport_state(state: RTCPeerConnectionState) -> Option<TransportState> {
    match state {
        RTCPeerConnectionState::New => Some(TransportState::New),
        RTCPeerConnectionState::Connecting => Some(TransportState::Connecting),
        RTCPeerConnectionState::Connected => Some(TransportState::Connected),
        RTCPeerConnectionState::Disconnected => Some(TransportState::Disconnected),
        RTCPeerConnectionState::Failed => Some(TransportState::Failed),
        RTCPeerConnectionState::Closed => Some(TransportState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription, ConnectionError> {
    let rtc = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(description.sdp)?,
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp)?,
        // The backend cannot roll back a local offer
        SdpType::Rollback => {
            return Err(ConnectionError::Negotiation(
                "rollback is not supported".to_string(),
            ));
        }
    };
    Ok(rtc)
}

fn from_rtc(description: RTCSessionDescription) -> Result<SessionDescription, ConnectionError> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => {
            return Err(ConnectionError::Negotiation(
                "description has no type".to_string(),
            ));
        }
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: description.sdp,
    })
}
