//! Shared utilities

pub mod error;
pub mod timer;

pub use error::{CaptureError, CaptureResult, ErrorResponse};
pub use timer::{spawn_cancellable, CancellationToken};
