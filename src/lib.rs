//! Clip Capture - record, preview, publish and moderate short video replies.
//!
//! This is the main library crate for the in-app video reply pipeline.
//! A `SessionLifecycle` owns one capture surface: it acquires the camera,
//! records a take of at most 30 seconds, previews it, uploads it to a video
//! comment thread or a group chat, and follows the moderation verdict.

pub mod capture;
pub mod config;
pub mod preview;
pub mod publish;
pub mod recorder;
pub mod utils;

#[cfg(test)]
mod testing;

pub use capture::{CodecDescriptor, MediaDevices, PlaybackSurface, VideoConstraints};
pub use config::PipelineConfig;
pub use publish::{
    HttpTransport, ModerationEvent, ModerationTicket, ParentRef, ReqwestTransport, Verdict,
};
pub use recorder::{CaptureBackends, Clip, SessionEvent, SessionLifecycle, SessionState};
pub use utils::{CaptureError, CaptureResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the default `tracing` subscriber.
///
/// `RUST_LOG` overrides the default filter. Does nothing if a global
/// subscriber is already set.
pub fn init_tracing() {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clip_capture=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_ok() {
        tracing::info!("Clip capture v{} logging initialized", env!("CARGO_PKG_VERSION"));
    }
}
