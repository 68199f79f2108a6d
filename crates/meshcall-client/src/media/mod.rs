mod coordinator;
mod devices;
mod render;
mod track;

pub use coordinator::{LocalMediaState, MediaTrackCoordinator};
pub use devices::{
    CursorCapture, DeviceInfo, DeviceKind, DeviceList, DisplayConstraints, DisplaySurface,
    MediaDevices, StreamConstraints, TrackConstraints,
};
pub use render::Renderer;
pub use track::{MediaStream, MediaTrack, RemoteStream, RemoteTrack, TrackKind, TrackSource};
