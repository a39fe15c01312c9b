//! Preview playback controller
//!
//! Shows a recorded clip on the playback surface through a revocable
//! object URL, looping, with toggle/seek controls.

use crate::capture::PlaybackSurface;
use crate::recorder::Clip;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Playback state after a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
}

/// Pick the duration to display and upload.
///
/// The container's own duration wins when it is usable; freshly assembled
/// recordings often report `NaN` or `Infinity`, in which case the duration
/// measured while recording is used.
pub fn resolve_duration(reported: f64, measured_secs: f64) -> f64 {
    if reported.is_finite() && reported >= 0.0 {
        reported
    } else {
        measured_secs
    }
}

/// Loop-playing preview of a clip
pub struct PreviewController {
    surface: Arc<dyn PlaybackSurface>,
    url: Option<String>,
    measured_secs: f64,
}

impl PreviewController {
    /// Load `clip` on `surface` and start looping playback
    pub fn open(surface: Arc<dyn PlaybackSurface>, clip: &Clip) -> Self {
        let url = surface.create_object_url(clip.data(), &clip.mime_type());
        surface.load(&url, true);
        surface.play();

        tracing::debug!("Preview opened at {} ({} bytes)", url, clip.len());
        Self {
            surface,
            url: Some(url),
            measured_secs: clip.elapsed_secs(),
        }
    }

    /// Current object URL, until revoked
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.url.is_some()
    }

    pub fn toggle_playback(&self) -> PlaybackState {
        if !self.is_active() {
            return PlaybackState::Paused;
        }

        if self.surface.is_paused() {
            self.surface.play();
            PlaybackState::Playing
        } else {
            self.surface.pause();
            PlaybackState::Paused
        }
    }

    /// Move the playhead, clamped to the clip. Returns the applied position.
    pub fn seek(&self, seconds: f64) -> f64 {
        if !self.is_active() {
            return 0.0;
        }

        let target = if seconds.is_finite() {
            seconds.clamp(0.0, self.resolved_duration())
        } else {
            0.0
        };
        self.surface.seek(target);
        target
    }

    pub fn current_time(&self) -> f64 {
        if self.is_active() {
            self.surface.current_time()
        } else {
            0.0
        }
    }

    /// Clip duration in seconds
    pub fn resolved_duration(&self) -> f64 {
        resolve_duration(self.surface.reported_duration(), self.measured_secs)
    }

    /// Detach the clip and revoke its URL. Returns `false` if already revoked.
    pub fn revoke(&mut self) -> bool {
        match self.url.take() {
            Some(url) => {
                self.surface.pause();
                self.surface.unload();
                self.surface.revoke_object_url(&url);
                tracing::debug!("Preview URL revoked: {}", url);
                true
            }
            None => false,
        }
    }
}

impl Drop for PreviewController {
    fn drop(&mut self) {
        self.revoke();
    }
}
