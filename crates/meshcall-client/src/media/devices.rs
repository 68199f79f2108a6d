use async_trait::async_trait;

use super::MediaStream;
use crate::error::MediaError;

const UNNAMED_DEVICE: &str = "(No name found)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    AudioInput,
    VideoInput,
    AudioOutput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    pub group_id: Option<String>,
    pub kind: DeviceKind,
    pub label: String,
}

impl DeviceInfo {
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            UNNAMED_DEVICE
        } else {
            &self.label
        }
    }

    /// Id to pass back when selecting this device
    pub fn selection_id(&self) -> &str {
        match self.group_id.as_deref() {
            Some(group) if !group.is_empty() => group,
            _ => &self.device_id,
        }
    }
}

/// Capture devices grouped for device selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceList {
    pub audio_inputs: Vec<DeviceInfo>,
    pub video_inputs: Vec<DeviceInfo>,
}

impl DeviceList {
    pub fn from_devices(devices: Vec<DeviceInfo>) -> Self {
        let mut list = Self::default();
        for device in devices {
            match device.kind {
                DeviceKind::AudioInput => list.audio_inputs.push(device),
                DeviceKind::VideoInput => list.video_inputs.push(device),
                DeviceKind::AudioOutput => {}
            }
        }
        list
    }
}

/// Constraint for one kind of capture track. `None` fields mean any device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackConstraints {
    pub device_id: Option<String>,
    pub group_id: Option<String>,
}

impl TrackConstraints {
    /// A selection id may be either a device id or a group id
    pub fn for_selection(selection: Option<&str>) -> Self {
        Self {
            device_id: selection.map(str::to_string),
            group_id: selection.map(str::to_string),
        }
    }
}

/// Which kinds to capture; an absent kind is not requested
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamConstraints {
    pub audio: Option<TrackConstraints>,
    pub video: Option<TrackConstraints>,
}

impl StreamConstraints {
    pub fn camera_and_microphone(audio_device: Option<&str>, video_device: Option<&str>) -> Self {
        Self {
            audio: Some(TrackConstraints::for_selection(audio_device)),
            video: Some(TrackConstraints::for_selection(video_device)),
        }
    }

    pub fn microphone(device: Option<&str>) -> Self {
        Self {
            audio: Some(TrackConstraints::for_selection(device)),
            video: None,
        }
    }

    pub fn camera(device: Option<&str>) -> Self {
        Self {
            audio: None,
            video: Some(TrackConstraints::for_selection(device)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorCapture {
    Always,
    Motion,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplaySurface {
    Monitor,
    Window,
    Browser,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayConstraints {
    pub cursor: CursorCapture,
    /// Preferred, the user may still pick another surface
    pub display_surface: DisplaySurface,
    pub audio: bool,
}

impl Default for DisplayConstraints {
    fn default() -> Self {
        Self {
            cursor: CursorCapture::Always,
            display_surface: DisplaySurface::Window,
            audio: true,
        }
    }
}

/// Platform capture backend
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn enumerate_capture_devices(&self) -> Result<Vec<DeviceInfo>, MediaError>;

    async fn acquire_stream(&self, constraints: &StreamConstraints) -> Result<MediaStream, MediaError>;

    async fn acquire_display_stream(
        &self,
        constraints: &DisplayConstraints,
    ) -> Result<MediaStream, MediaError>;
}
