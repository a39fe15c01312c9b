//! Capture session state
//!
//! Defines the session state machine and the per-session resources it
//! governs.

use super::clip::{Clip, ClipRecorder};
use crate::capture::{CodecDescriptor, DeviceSession};
use crate::preview::PreviewController;
use crate::publish::{ModerationTicket, PollHandle, Verdict};
use crate::utils::error::{CaptureError, CaptureResult};
use crate::utils::timer::CancellationToken;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Current state of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    /// Waiting for camera and microphone
    CameraInitializing,
    /// Live view, ready to record
    CameraReady,
    /// Currently recording
    Recording,
    /// Previewing the recorded clip
    Reviewing,
    /// Clip is being published
    Uploading,
    /// Waiting for a moderation verdict
    Polling,
    /// Session ended; all resources released
    Closed,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::CameraInitializing
    }
}

impl SessionState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        if next == Closed {
            return self != Closed;
        }
        matches!(
            (self, next),
            (CameraInitializing, CameraReady)
                | (CameraReady, Recording)
                | (Recording, Reviewing)
                | (Reviewing, Uploading)
                | (Reviewing, CameraInitializing)
                | (Uploading, Polling)
                | (Uploading, Reviewing)
        )
    }

    pub fn is_closed(self) -> bool {
        self == SessionState::Closed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::CameraInitializing => "camera-initializing",
            SessionState::CameraReady => "camera-ready",
            SessionState::Recording => "recording",
            SessionState::Reviewing => "reviewing",
            SessionState::Uploading => "uploading",
            SessionState::Polling => "polling",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by a capture session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// Recording progress
    Elapsed(Duration),
    /// Upload failed; the session is back in review with the clip intact
    UploadFailed { message: String },
    /// Moderation settled; dependent views should refresh
    VerdictReached {
        ticket: ModerationTicket,
        verdict: Verdict,
    },
    /// The uploaded item disappeared; dependent views should resync
    TargetGone { ticket: ModerationTicket },
}

/// Resources owned by one capture surface
pub struct RecordingSession {
    pub id: Uuid,
    pub state: SessionState,
    pub device: DeviceSession,
    /// Chosen once, before the first acquisition; kept across retakes
    pub selected_codec: Option<CodecDescriptor>,
    pub recorder: Option<ClipRecorder>,
    /// Scope of the current take's timers
    pub take_scope: Option<CancellationToken>,
    pub clip: Option<Clip>,
    pub preview: Option<PreviewController>,
    pub ticket: Option<ModerationTicket>,
    /// Moderation poll for the uploaded clip
    pub poll: Option<PollHandle>,
}

impl RecordingSession {
    pub fn new(device: DeviceSession) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::default(),
            device,
            selected_codec: None,
            recorder: None,
            take_scope: None,
            clip: None,
            preview: None,
            ticket: None,
            poll: None,
        }
    }

    /// Fail unless the session is in `state`
    pub fn require(&self, state: SessionState, operation: &'static str) -> CaptureResult<()> {
        if self.state.is_closed() {
            return Err(CaptureError::SessionClosed);
        }
        if self.state != state {
            return Err(CaptureError::InvalidState {
                operation,
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    /// Move to `next`, returning the previous state
    pub fn transition(&mut self, next: SessionState) -> CaptureResult<SessionState> {
        if !self.state.can_transition_to(next) {
            if self.state.is_closed() {
                return Err(CaptureError::SessionClosed);
            }
            return Err(CaptureError::InvalidState {
                operation: "change state",
                state: self.state.to_string(),
            });
        }
        let from = self.state;
        self.state = next;
        Ok(from)
    }

    /// Tick-derived elapsed time of the current or last take
    pub fn elapsed(&self) -> Duration {
        match (&self.recorder, &self.clip) {
            (Some(recorder), _) => recorder.elapsed(),
            (None, Some(clip)) => clip.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }
}
