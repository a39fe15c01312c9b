//! Camera + microphone acquisition
//!
//! A `DeviceSession` owns at most one live stream. Releasing is idempotent
//! at both levels: the session forgets its handle, and the handle itself
//! stops its tracks only once.

use super::traits::{DeviceError, MediaDevices, MediaTrack, TrackKind, VideoConstraints};
use crate::utils::error::{CaptureError, CaptureResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Exclusive handle to an acquired camera + microphone stream
pub struct StreamHandle {
    id: Uuid,
    tracks: Vec<MediaTrack>,
    released: AtomicBool,
    devices: Arc<dyn MediaDevices>,
}

impl StreamHandle {
    /// Unique ID of this acquisition
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn video_track(&self) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Video)
    }

    /// Whether the tracks are still running
    pub fn is_live(&self) -> bool {
        !self.released.load(Ordering::SeqCst)
    }

    /// Stop every track. Returns `false` if the stream was already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }

        for track in &self.tracks {
            self.devices.stop_track(track);
        }
        tracing::info!("Released capture stream {}", self.id);
        true
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if self.release() {
            tracing::warn!("Capture stream {} released on drop", self.id);
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.id)
            .field("tracks", &self.tracks)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Detached acquisition request, usable without holding the session.
#[derive(Clone)]
pub struct StreamOpener {
    devices: Arc<dyn MediaDevices>,
    constraints: VideoConstraints,
}

impl StreamOpener {
    /// Request camera and microphone concurrently.
    ///
    /// If either request fails, any track that did open is stopped and a
    /// single error is returned. Permission denial wins over other failures.
    pub async fn open(self) -> CaptureResult<StreamHandle> {
        let (camera, microphone) = tokio::join!(
            self.devices.open_camera(&self.constraints),
            self.devices.open_microphone()
        );

        match (camera, microphone) {
            (Ok(video), Ok(audio)) => {
                let handle = StreamHandle {
                    id: Uuid::new_v4(),
                    tracks: vec![video, audio],
                    released: AtomicBool::new(false),
                    devices: self.devices.clone(),
                };
                tracing::info!(
                    "Acquired capture stream {} (camera: {}, mirrored: {})",
                    handle.id,
                    handle.video_track().map(|t| t.label.as_str()).unwrap_or("?"),
                    self.constraints.mirrored
                );
                Ok(handle)
            }
            (camera, microphone) => {
                let mut errors = Vec::new();
                for result in [camera, microphone] {
                    match result {
                        Ok(track) => self.devices.stop_track(&track),
                        Err(e) => errors.push(e),
                    }
                }
                Err(consolidate(errors))
            }
        }
    }
}

fn consolidate(errors: Vec<DeviceError>) -> CaptureError {
    let message = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");

    let denied = errors
        .iter()
        .any(|e| matches!(e, DeviceError::PermissionDenied(_)));

    tracing::warn!("Capture stream acquisition failed: {}", message);
    if denied {
        CaptureError::PermissionDenied(message)
    } else {
        CaptureError::DeviceUnavailable(message)
    }
}

/// Owner of the session's single live stream
pub struct DeviceSession {
    devices: Arc<dyn MediaDevices>,
    constraints: VideoConstraints,
    stream: Option<StreamHandle>,
    acquiring: bool,
}

impl DeviceSession {
    pub fn new(devices: Arc<dyn MediaDevices>, constraints: VideoConstraints) -> Self {
        Self {
            devices,
            constraints,
            stream: None,
            acquiring: false,
        }
    }

    /// Acquire a stream and keep it in this session
    pub async fn acquire(&mut self) -> CaptureResult<&StreamHandle> {
        let opener = self.begin_acquire()?;
        match opener.open().await {
            Ok(handle) => Ok(self.adopt(handle)),
            Err(e) => {
                self.abandon_acquire();
                Err(e)
            }
        }
    }

    /// Start an acquisition that completes outside this borrow.
    ///
    /// Fails with `StreamAlreadyHeld` while a stream is held or another
    /// acquisition is pending.
    pub fn begin_acquire(&mut self) -> CaptureResult<StreamOpener> {
        if self.stream.is_some() || self.acquiring {
            tracing::error!("Stream acquisition requested while one is already held");
            return Err(CaptureError::StreamAlreadyHeld);
        }
        self.acquiring = true;
        Ok(StreamOpener {
            devices: self.devices.clone(),
            constraints: self.constraints.clone(),
        })
    }

    /// Install the stream produced by a `StreamOpener`
    pub fn adopt(&mut self, handle: StreamHandle) -> &StreamHandle {
        self.acquiring = false;
        if let Some(previous) = self.stream.take() {
            tracing::error!("Replacing live stream {} without release", previous.id());
            previous.release();
        }
        self.stream.insert(handle)
    }

    /// Mark a pending acquisition as failed or discarded
    pub fn abandon_acquire(&mut self) {
        self.acquiring = false;
    }

    pub fn stream(&self) -> Option<&StreamHandle> {
        self.stream.as_ref()
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// Release the held stream, if any. Safe to call repeatedly.
    pub fn release(&mut self) -> bool {
        match self.stream.take() {
            Some(handle) => handle.release(),
            None => false,
        }
    }
}
