use meshcall_protocol::{SignalEnvelope, SignalPayload};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::devices::{DeviceList, DisplayConstraints, MediaDevices, StreamConstraints};
use super::track::{MediaStream, MediaTrack, TrackKind, TrackSource};
use crate::error::{MediaError, PresentationError};
use crate::network::SignalSender;
use crate::peer::PeerConnectionManager;

const ALL_SOURCES: [TrackSource; 3] = [
    TrackSource::Microphone,
    TrackSource::Camera,
    TrackSource::Screen,
];

/// Local capture state. Only mutated under the coordinator's lock.
#[derive(Debug, Clone)]
pub struct LocalMediaState {
    pub stream: MediaStream,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub presenting: bool,
    pub audio_device: Option<String>,
    pub video_device: Option<String>,
}

impl Default for LocalMediaState {
    fn default() -> Self {
        Self {
            stream: MediaStream::default(),
            audio_enabled: true,
            video_enabled: true,
            presenting: false,
            audio_device: None,
            video_device: None,
        }
    }
}

impl LocalMediaState {
    fn enabled(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.audio_enabled,
            TrackKind::Video => self.video_enabled,
        }
    }
}

/// Owns the local tracks and pushes every change out to all peer links
pub struct MediaTrackCoordinator {
    devices: Arc<dyn MediaDevices>,
    peers: PeerConnectionManager,
    signals: SignalSender,
    state: Mutex<LocalMediaState>,
}

impl MediaTrackCoordinator {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        peers: PeerConnectionManager,
        signals: SignalSender,
    ) -> Self {
        Self {
            devices,
            peers,
            signals,
            state: Mutex::new(LocalMediaState::default()),
        }
    }

    pub async fn snapshot(&self) -> LocalMediaState {
        self.state.lock().await.clone()
    }

    pub async fn is_presenting(&self) -> bool {
        self.state.lock().await.presenting
    }

    pub async fn local_tracks(&self) -> Vec<MediaTrack> {
        self.state.lock().await.stream.tracks().to_vec()
    }

    /// Acquire camera and microphone and publish them
    pub async fn start(&self) -> Result<(), MediaError> {
        let mut state = self.state.lock().await;
        let constraints = StreamConstraints::camera_and_microphone(
            state.audio_device.as_deref(),
            state.video_device.as_deref(),
        );
        let stream = self.devices.acquire_stream(&constraints).await?;

        self.replace_tracks(&mut state, &ALL_SOURCES, stream)
            .await;
        tracing::info!("Local media started");
        Ok(())
    }

    pub async fn start_presenting(&self) -> Result<(), PresentationError> {
        let mut state = self.state.lock().await;
        if state.presenting {
            return Err(PresentationError::AlreadyPresenting);
        }
        // Only as good as the presenting flags we have seen so far
        if let Some(peer) = self.peers.presenting_peer().await {
            tracing::info!("Not presenting, {} already is", peer);
            return Err(PresentationError::PeerPresenting(peer));
        }

        let display = self
            .devices
            .acquire_display_stream(&DisplayConstraints::default())
            .await?;

        self.replace_tracks(&mut state, &[TrackSource::Camera], display)
            .await;
        state.presenting = true;
        self.announce_presenting(true);

        tracing::info!("Started presenting");
        Ok(())
    }

    pub async fn stop_presenting(&self) -> Result<(), PresentationError> {
        let mut state = self.state.lock().await;
        if !state.presenting {
            return Err(PresentationError::NotPresenting);
        }

        let constraints = StreamConstraints::camera_and_microphone(
            state.audio_device.as_deref(),
            state.video_device.as_deref(),
        );
        let stream = self.devices.acquire_stream(&constraints).await?;

        self.replace_tracks(&mut state, &ALL_SOURCES, stream)
            .await;
        state.presenting = false;
        self.announce_presenting(false);

        tracing::info!("Stopped presenting");
        Ok(())
    }

    /// Returns whether we are presenting afterwards
    pub async fn toggle_presenting(&self) -> Result<bool, PresentationError> {
        if self.is_presenting().await {
            self.stop_presenting().await.map(|_| false)
        } else {
            self.start_presenting().await.map(|_| true)
        }
    }

    pub async fn set_audio_device(&self, device_id: &str) -> Result<(), MediaError> {
        let mut state = self.state.lock().await;
        let stream = self
            .devices
            .acquire_stream(&StreamConstraints::microphone(Some(device_id)))
            .await?;

        self.replace_tracks(&mut state, &[TrackSource::Microphone], stream)
            .await;
        state.audio_device = Some(device_id.to_string());

        tracing::info!("Switched microphone to {}", device_id);
        Ok(())
    }

    pub async fn set_video_device(&self, device_id: &str) -> Result<(), MediaError> {
        let mut state = self.state.lock().await;
        if state.presenting {
            tracing::debug!("Camera {} will be used when presenting stops", device_id);
            state.video_device = Some(device_id.to_string());
            return Ok(());
        }

        let stream = self
            .devices
            .acquire_stream(&StreamConstraints::camera(Some(device_id)))
            .await?;

        self.replace_tracks(&mut state, &[TrackSource::Camera], stream)
            .await;
        state.video_device = Some(device_id.to_string());

        tracing::info!("Switched camera to {}", device_id);
        Ok(())
    }

    /// Returns the new enabled flag
    pub async fn toggle_audio(&self) -> bool {
        self.toggle_kind(TrackKind::Audio).await
    }

    /// Returns the new enabled flag
    pub async fn toggle_video(&self) -> bool {
        self.toggle_kind(TrackKind::Video).await
    }

    async fn toggle_kind(&self, kind: TrackKind) -> bool {
        let mut state = self.state.lock().await;
        let enabled = match kind {
            TrackKind::Audio => {
                state.audio_enabled = !state.audio_enabled;
                state.audio_enabled
            }
            TrackKind::Video => {
                state.video_enabled = !state.video_enabled;
                state.video_enabled
            }
        };

        for track in state.stream.tracks_of(kind) {
            track.set_enabled(enabled);
        }
        tracing::debug!("Local {} enabled: {}", kind, enabled);
        enabled
    }

    pub async fn enumerate_devices(&self) -> Result<DeviceList, MediaError> {
        let devices = self.devices.enumerate_capture_devices().await?;
        Ok(DeviceList::from_devices(devices))
    }

    /// Swap the local tracks captured from `sources` for `replacement` and
    /// fan out to every peer link while the state lock is held. A microphone
    /// switch leaves the audio of a screen capture alone.
    async fn replace_tracks(
        &self,
        state: &mut LocalMediaState,
        sources: &[TrackSource],
        replacement: MediaStream,
    ) {
        let tracks = replacement.into_tracks();
        for track in &tracks {
            track.set_enabled(state.enabled(track.kind()));
        }

        state.stream.remove_sources(sources);
        for track in &tracks {
            state.stream.add_track(track.clone());
        }

        self.peers.broadcast_local_tracks(sources, &tracks).await;
    }

    fn announce_presenting(&self, presenting: bool) {
        let envelope = SignalEnvelope::broadcast(SignalPayload::Presenting(presenting));
        if self.signals.send(envelope).is_err() {
            tracing::debug!("Signaling closed, presenting flag not sent");
        }
    }
}
