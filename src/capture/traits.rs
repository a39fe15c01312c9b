//! Capture trait definitions
//!
//! Platform-agnostic traits for the device capture API and the playback
//! surface used by the preview.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// A live track handed out by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaTrack {
    /// Platform track ID
    pub id: String,

    /// Video or audio
    pub kind: TrackKind,

    /// Human readable device label
    pub label: String,
}

/// Which camera to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    Environment,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Camera request passed to the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    /// Camera to use (front camera for selfie framing)
    pub facing: FacingMode,

    /// Mirror the live view horizontally
    pub mirrored: bool,

    /// Preferred resolution, if any
    pub ideal_resolution: Option<Resolution>,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::User,
            mirrored: true,
            ideal_resolution: Some(Resolution {
                width: 1280,
                height: 720,
            }),
        }
    }
}

/// Failures reported by the platform
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("device not found: {0}")]
    NotFound(String),

    #[error("device busy: {0}")]
    Busy(String),

    #[error("recorder failure: {0}")]
    Recorder(String),
}

/// Chunked recording primitive bound to a set of live tracks.
///
/// The platform buffers encoded media internally; each `request_data` call
/// returns whatever was produced since the previous call.
pub trait MediaRecorder: Send {
    /// Begin encoding
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Drain the data produced since the last drain. May be empty.
    fn request_data(&mut self) -> Vec<u8>;

    /// Stop encoding and drain the remaining data
    fn stop(&mut self) -> Vec<u8>;
}

/// Device capture API
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Open a camera track
    async fn open_camera(&self, constraints: &VideoConstraints) -> Result<MediaTrack, DeviceError>;

    /// Open a microphone track
    async fn open_microphone(&self) -> Result<MediaTrack, DeviceError>;

    /// Stop a track and release the underlying hardware
    fn stop_track(&self, track: &MediaTrack);

    /// Whether the platform can record into the given MIME type
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Create a recorder over the given tracks
    fn create_recorder(
        &self,
        tracks: &[MediaTrack],
        mime_type: &str,
    ) -> Result<Box<dyn MediaRecorder>, DeviceError>;
}

/// Video element used to play back a recorded clip
pub trait PlaybackSurface: Send + Sync {
    /// Create a revocable URL for in-memory media
    fn create_object_url(&self, data: &Arc<[u8]>, mime_type: &str) -> String;

    /// Revoke a URL previously returned by `create_object_url`
    fn revoke_object_url(&self, url: &str);

    /// Replace whatever the surface shows with the given source
    fn load(&self, url: &str, looping: bool);

    /// Detach the current source
    fn unload(&self);

    fn play(&self);

    fn pause(&self);

    fn is_paused(&self) -> bool;

    /// Position the playhead (seconds)
    fn seek(&self, seconds: f64);

    /// Playhead position (seconds)
    fn current_time(&self) -> f64;

    /// Duration reported by the container. Freshly assembled recordings
    /// often report `NaN` or `Infinity` here.
    fn reported_duration(&self) -> f64;
}
