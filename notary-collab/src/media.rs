//! Local media devices.
//!
//! Only acquisition and release are modelled; no frames are captured or
//! encoded. A [`MediaTrack`] is held for as long as the session uses the
//! device and released when dropped.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Microphone,
    Camera,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 2] = [DeviceKind::Microphone, DeviceKind::Camera];
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Microphone => write!(f, "microphone"),
            DeviceKind::Camera => write!(f, "camera"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("{0} permission denied")]
    Denied(DeviceKind),
    #[error("{0} is in use by another application")]
    Busy(DeviceKind),
    #[error("no {0} found")]
    NotFound(DeviceKind),
}

impl MediaError {
    pub fn device(&self) -> DeviceKind {
        match *self {
            MediaError::Denied(kind) | MediaError::Busy(kind) | MediaError::NotFound(kind) => kind,
        }
    }

    /// Status text shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            MediaError::Denied(kind) => {
                format!("Please allow {kind} access in your system settings")
            }
            MediaError::Busy(kind) => {
                format!("Your {kind} is being used by another application")
            }
            MediaError::NotFound(kind) => format!("No {kind} detected, continuing without it"),
        }
    }
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// An acquired local device. Released on drop.
pub struct MediaTrack {
    kind: DeviceKind,
    label: String,
    on_release: Option<ReleaseHook>,
}

impl MediaTrack {
    pub fn new(kind: DeviceKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            on_release: None,
        }
    }

    /// Run `hook` once when the track is released.
    pub fn with_release_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .finish()
    }
}

impl Drop for MediaTrack {
    fn drop(&mut self) {
        log::debug!("Released {} track '{}'", self.kind, self.label);
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

/// Access to local capture devices.
pub trait MediaDevices: Send {
    fn acquire(&mut self, kind: DeviceKind) -> Result<MediaTrack, MediaError>;
}

/// A machine without capture devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessMedia;

impl MediaDevices for HeadlessMedia {
    fn acquire(&mut self, kind: DeviceKind) -> Result<MediaTrack, MediaError> {
        Err(MediaError::NotFound(kind))
    }
}
