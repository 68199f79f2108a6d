use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use crate::error::MediaError;

/// Stream id every local track is published under
const LOCAL_STREAM_ID: &str = "meshcall-local";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

impl TrackKind {
    fn codec(&self) -> RTCRtpCodecCapability {
        match self {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
        }
    }
}

/// Where a local track is captured from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Microphone,
    Camera,
    /// Screen or window capture, video or the audio that came with it
    Screen,
}

/// Handle to a captured local track.
///
/// Clones share the enabled flag and the sample sink. Every peer link sends
/// from the same sink, so one encoded sample reaches all of them, and
/// muting the copy held by the local stream mutes every link.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

struct TrackInner {
    id: String,
    kind: TrackKind,
    source: TrackSource,
    label: String,
    enabled: AtomicBool,
    sink: Arc<TrackLocalStaticSample>,
}

impl fmt::Debug for TrackInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackInner")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("label", &self.label)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl MediaTrack {
    pub fn new(
        id: impl Into<String>,
        kind: TrackKind,
        source: TrackSource,
        label: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let sink = Arc::new(TrackLocalStaticSample::new(
            kind.codec(),
            id.clone(),
            LOCAL_STREAM_ID.to_owned(),
        ));
        Self {
            inner: Arc::new(TrackInner {
                id,
                kind,
                source,
                label: label.into(),
                enabled: AtomicBool::new(true),
                sink,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// The WebRTC track peer connections send from
    pub fn sink(&self) -> Arc<TrackLocalStaticSample> {
        self.inner.sink.clone()
    }

    /// Push one encoded sample to every link sending this track. Returns
    /// false when the track is disabled and the sample was dropped.
    pub async fn write_sample(&self, sample: &Sample) -> Result<bool, MediaError> {
        if !self.is_enabled() {
            return Ok(false);
        }
        self.inner
            .sink
            .write_sample(sample)
            .await
            .map_err(|e| MediaError::Device(e.to_string()))?;
        Ok(true)
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for MediaTrack {}

/// Ordered set of local tracks
#[derive(Debug, Clone, Default)]
pub struct MediaStream {
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(move |t| t.kind() == kind)
    }

    pub fn add_track(&mut self, track: MediaTrack) {
        self.tracks.push(track);
    }

    /// Remove and return every track captured from one of `sources`
    pub fn remove_sources(&mut self, sources: &[TrackSource]) -> Vec<MediaTrack> {
        let (removed, kept) = std::mem::take(&mut self.tracks)
            .into_iter()
            .partition(|t| sources.contains(&t.source()));
        self.tracks = kept;
        removed
    }

    pub fn into_tracks(self) -> Vec<MediaTrack> {
        self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Track received from a remote participant
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
    pub source: Option<Arc<TrackRemote>>,
}

impl RemoteTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            source: None,
        }
    }

    pub fn with_source(mut self, source: Arc<TrackRemote>) -> Self {
        self.source = Some(source);
        self
    }
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

/// Tracks one remote participant is sending, shared with the renderer
#[derive(Debug, Clone, Default)]
pub struct RemoteStream {
    tracks: Arc<RwLock<Vec<RemoteTrack>>>,
}

impl RemoteStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// A newly arrived video track replaces the previous one; audio accumulates
    pub async fn add_track(&self, track: RemoteTrack) {
        let mut tracks = self.tracks.write().await;
        if track.kind == TrackKind::Video {
            tracks.retain(|t| t.kind != TrackKind::Video);
        }
        tracks.push(track);
    }

    pub async fn tracks(&self) -> Vec<RemoteTrack> {
        self.tracks.read().await.clone()
    }

    pub async fn video_track(&self) -> Option<RemoteTrack> {
        self.tracks
            .read()
            .await
            .iter()
            .find(|t| t.kind == TrackKind::Video)
            .cloned()
    }
}
