//! Device capture
//!
//! This module wraps the platform's camera/microphone API: stream
//! acquisition and release, and codec negotiation.

pub mod codec;
pub mod device;
pub mod traits;

pub use codec::{negotiate, CodecDescriptor};
pub use device::{DeviceSession, StreamHandle, StreamOpener};
pub use traits::{
    DeviceError, FacingMode, MediaDevices, MediaRecorder, MediaTrack, PlaybackSurface,
    Resolution, TrackKind, VideoConstraints,
};
