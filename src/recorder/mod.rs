//! Recording and session lifecycle
//!
//! This module implements the capture surface's recording side:
//! - ClipRecorder to drive a single take with flush and hard-stop timers
//! - SessionLifecycle to orchestrate device, recorder, preview and publish
//! - Session state machine shared by both

pub mod clip;
pub mod coordinator;
pub mod state;

pub use clip::{Clip, ClipRecorder, RecorderConfig, RecorderEvent, RecorderPhase, StopReason};
pub use coordinator::{CaptureBackends, SessionLifecycle};
pub use state::{RecordingSession, SessionEvent, SessionState};
