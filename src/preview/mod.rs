//! Clip preview
//!
//! Replaces the live camera view with a scrubbable, looping playback of the
//! recorded clip.

mod controller;

pub use controller::{resolve_duration, PlaybackState, PreviewController};
