//! Codec negotiation
//!
//! Picks the first container/codec combination the platform can record.

use super::traits::MediaDevices;
use crate::utils::error::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A container with optional video/audio codec constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecDescriptor {
    /// Container subtype, e.g. `webm` or `mp4`
    pub container: String,

    /// Video codec, e.g. `vp9`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,

    /// Audio codec, e.g. `opus`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl CodecDescriptor {
    pub fn new(container: &str, video: Option<&str>, audio: Option<&str>) -> Self {
        Self {
            container: container.to_string(),
            video: video.map(str::to_string),
            audio: audio.map(str::to_string),
        }
    }

    /// Full MIME type, e.g. `video/webm;codecs=vp9,opus`
    pub fn mime_type(&self) -> String {
        let codecs: Vec<&str> = [self.video.as_deref(), self.audio.as_deref()]
            .into_iter()
            .flatten()
            .collect();

        if codecs.is_empty() {
            format!("video/{}", self.container)
        } else {
            format!("video/{};codecs={}", self.container, codecs.join(","))
        }
    }

    /// File extension for uploads
    pub fn extension(&self) -> &str {
        &self.container
    }

    /// Royalty-free WebM first, then broader fallbacks
    pub fn default_preferences() -> Vec<CodecDescriptor> {
        vec![
            CodecDescriptor::new("webm", Some("vp9"), Some("opus")),
            CodecDescriptor::new("webm", Some("vp8"), Some("opus")),
            CodecDescriptor::new("webm", None, None),
            CodecDescriptor::new("mp4", None, None),
        ]
    }
}

impl fmt::Display for CodecDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mime_type())
    }
}

/// Return the first descriptor the platform reports as supported.
pub fn negotiate(
    devices: &dyn MediaDevices,
    preferences: &[CodecDescriptor],
) -> CaptureResult<CodecDescriptor> {
    for candidate in preferences {
        let mime = candidate.mime_type();
        if devices.is_type_supported(&mime) {
            tracing::info!("Negotiated recording codec: {}", mime);
            return Ok(candidate.clone());
        }
        tracing::debug!("Codec not supported, trying next: {}", mime);
    }

    tracing::warn!(
        "None of {} preferred codecs are supported",
        preferences.len()
    );
    Err(CaptureError::Unsupported)
}
