use meshcall_protocol::ParticipantId;
use thiserror::Error;

use crate::media::TrackKind;

/// Failure of a single peer connection operation
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("WebRTC error: {0}")]
    Rtc(#[from] webrtc::Error),

    #[error("Negotiation error: {0}")]
    Negotiation(String),
}

/// Failure to acquire capture tracks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Permission to capture was denied")]
    PermissionDenied,

    #[error("No {0} capture device available")]
    NoDevice(TrackKind),

    #[error("Capture was cancelled")]
    Cancelled,

    #[error("Device error: {0}")]
    Device(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresentationError {
    #[error("Participant {0} is already presenting")]
    PeerPresenting(ParticipantId),

    #[error("Already presenting")]
    AlreadyPresenting,

    #[error("Not presenting")]
    NotPresenting,

    #[error(transparent)]
    Media(#[from] MediaError),
}
