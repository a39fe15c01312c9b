//! Capture session coordinator
//!
//! `SessionLifecycle` drives one capture surface through
//! `camera-initializing → camera-ready → recording → reviewing → uploading
//! → polling → closed`, with retake (`reviewing → camera-initializing`) and
//! close available from any state.
//!
//! Every transition into `closed` runs the same cleanup, in order: cancel
//! recording timers, cancel the poll timer, release the device stream,
//! revoke the preview URL. It runs whether the session ended in success,
//! cancellation or error, and again (as a no-op) when the last handle is
//! dropped.

use super::clip::{Clip, ClipRecorder, RecorderEvent, StopReason};
use super::state::{RecordingSession, SessionEvent, SessionState};
use crate::capture::{negotiate, DeviceSession, MediaDevices, PlaybackSurface};
use crate::config::PipelineConfig;
use crate::preview::{PlaybackState, PreviewController};
use crate::publish::{
    HttpTransport, ModerationEvent, ModerationTicket, ParentRef, PollHandle, PollOutcome,
    ReqwestTransport, UploadSubmitter, UploadTarget, VerdictPoller,
};
use crate::utils::error::{CaptureError, CaptureResult};
use crate::utils::timer::{spawn_cancellable, CancellationToken};
use parking_lot::{Mutex, MutexGuard};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Platform and network collaborators of a session
#[derive(Clone)]
pub struct CaptureBackends {
    pub devices: Arc<dyn MediaDevices>,
    pub surface: Arc<dyn PlaybackSurface>,
    pub transport: Arc<dyn HttpTransport>,
}

impl CaptureBackends {
    /// Platform collaborators plus a `reqwest` transport built from `config`
    pub fn with_reqwest(
        devices: Arc<dyn MediaDevices>,
        surface: Arc<dyn PlaybackSurface>,
        config: &PipelineConfig,
    ) -> CaptureResult<Self> {
        Ok(Self {
            devices,
            surface,
            transport: Arc::new(ReqwestTransport::from_config(config)?),
        })
    }
}

struct Shared {
    session: Mutex<RecordingSession>,
    parent: ParentRef,
    config: PipelineConfig,
    devices: Arc<dyn MediaDevices>,
    surface: Arc<dyn PlaybackSurface>,
    submitter: UploadSubmitter,
    poller: VerdictPoller,
    recording_scope: CancellationToken,
    poll_scope: CancellationToken,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn transition(&self, session: &mut RecordingSession, next: SessionState) -> CaptureResult<()> {
        let from = session.transition(next)?;
        tracing::info!("Session {}: {} -> {}", session.id, from, next);
        self.emit(SessionEvent::StateChanged { from, to: next });
        Ok(())
    }

    /// Release everything the session holds. Idempotent.
    fn cleanup(&self, session: &mut RecordingSession) {
        self.recording_scope.cancel();
        if let Some(recorder) = session.recorder.take() {
            recorder.discard();
        }
        session.take_scope = None;

        self.poll_scope.cancel();
        if let Some(poll) = session.poll.take() {
            poll.cancel();
        }

        session.device.release();

        if let Some(mut preview) = session.preview.take() {
            preview.revoke();
        }
        session.clip = None;
    }

    fn close(&self, session: &mut RecordingSession, reason: &str) {
        self.cleanup(session);
        if session.state.is_closed() {
            return;
        }

        let from = session.state;
        session.state = SessionState::Closed;
        tracing::info!("Session {} closed from {} ({})", session.id, from, reason);
        self.emit(SessionEvent::StateChanged {
            from,
            to: SessionState::Closed,
        });
    }

    fn enter_review(&self, session: &mut RecordingSession, clip: Clip) -> CaptureResult<()> {
        // The live view gives way to the clip
        session.device.release();
        session.preview = Some(PreviewController::open(self.surface.clone(), &clip));
        session.clip = Some(clip);
        self.transition(session, SessionState::Reviewing)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let mut session = self.session.lock();
        if !session.state.is_closed() {
            tracing::warn!("Session {} dropped without close", session.id);
        }
        self.close(&mut session, "dropped");
    }
}

/// Orchestrates one capture surface. Cheap to clone; clones share the
/// session.
#[derive(Clone)]
pub struct SessionLifecycle {
    shared: Arc<Shared>,
}

impl SessionLifecycle {
    /// Create a session in `camera-initializing` without touching devices
    pub fn new(config: PipelineConfig, parent: ParentRef, backends: CaptureBackends) -> Self {
        let (events, _) = broadcast::channel(128);
        let endpoints = config.endpoints();
        let device = DeviceSession::new(backends.devices.clone(), config.camera.clone());

        let session = RecordingSession::new(device);
        tracing::info!("Opening capture session {} for {}", session.id, parent);

        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                parent,
                submitter: UploadSubmitter::new(backends.transport.clone(), endpoints.clone()),
                poller: VerdictPoller::new(backends.transport, endpoints, config.poll()),
                config,
                devices: backends.devices,
                surface: backends.surface,
                recording_scope: CancellationToken::new(),
                poll_scope: CancellationToken::new(),
                events,
            }),
        }
    }

    /// Create a session and bring the camera up
    pub async fn open(
        config: PipelineConfig,
        parent: ParentRef,
        backends: CaptureBackends,
    ) -> CaptureResult<Self> {
        let lifecycle = Self::new(config, parent, backends);
        lifecycle.initialize_camera().await?;
        Ok(lifecycle)
    }

    fn lock(&self) -> MutexGuard<'_, RecordingSession> {
        self.shared.session.lock()
    }

    pub fn session_id(&self) -> Uuid {
        self.lock().id
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn parent(&self) -> &ParentRef {
        &self.shared.parent
    }

    /// Session events: state changes, progress, moderation results
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Refresh/resync notifications for views outside the capture surface
    pub fn moderation_events(&self) -> broadcast::Receiver<ModerationEvent> {
        self.shared.poller.subscribe()
    }

    /// Tick-derived duration of the current or last take
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed()
    }

    pub fn clip(&self) -> Option<Clip> {
        self.lock().clip.clone()
    }

    pub fn ticket(&self) -> Option<ModerationTicket> {
        self.lock().ticket.clone()
    }

    pub fn preview_url(&self) -> Option<String> {
        self.lock()
            .preview
            .as_ref()
            .and_then(|p| p.url().map(str::to_string))
    }

    /// Negotiate the codec (first time only) and acquire the camera.
    ///
    /// An unsupported platform or a failed acquisition closes the session.
    pub async fn initialize_camera(&self) -> CaptureResult<()> {
        let opener = {
            let mut session = self.lock();
            session.require(SessionState::CameraInitializing, "initialize camera")?;

            if session.selected_codec.is_none() {
                match negotiate(
                    self.shared.devices.as_ref(),
                    &self.shared.config.codec_preferences,
                ) {
                    Ok(codec) => session.selected_codec = Some(codec),
                    Err(e) => {
                        self.shared.close(&mut session, "recording not supported");
                        return Err(e);
                    }
                }
            }

            session.device.begin_acquire()?
        };

        let result = opener.open().await;

        let mut session = self.lock();
        match result {
            Ok(handle) => {
                if session.state != SessionState::CameraInitializing {
                    session.device.abandon_acquire();
                    handle.release();
                    tracing::info!("Session closed during camera start; stream released");
                    return Err(CaptureError::SessionClosed);
                }
                session.device.adopt(handle);
                self.shared.transition(&mut session, SessionState::CameraReady)
            }
            Err(e) => {
                session.device.abandon_acquire();
                self.shared.close(&mut session, "camera unavailable");
                Err(e)
            }
        }
    }

    /// Begin a take on the live stream
    pub fn start_recording(&self) -> CaptureResult<()> {
        let mut session = self.lock();
        session.require(SessionState::CameraReady, "start recording")?;

        let codec = session
            .selected_codec
            .clone()
            .ok_or(CaptureError::Unsupported)?;

        let take_scope = self.shared.recording_scope.child_token();
        let recorder = ClipRecorder::new(
            self.shared.devices.clone(),
            self.shared.config.recorder(),
            take_scope.child_token(),
        );
        let events = recorder.subscribe();

        if let Err(e) = recorder.start(session.device.stream(), &codec) {
            take_scope.cancel();
            return Err(e);
        }

        self.spawn_recorder_watch(events, take_scope.child_token());
        session.recorder = Some(recorder);
        session.take_scope = Some(take_scope);
        self.shared.transition(&mut session, SessionState::Recording)
    }

    /// Forward progress and react to the hard-stop
    fn spawn_recorder_watch(
        &self,
        mut events: broadcast::Receiver<RecorderEvent>,
        token: CancellationToken,
    ) {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        spawn_cancellable(token, async move {
            loop {
                match events.recv().await {
                    Ok(RecorderEvent::Tick { elapsed }) => match weak.upgrade() {
                        Some(shared) => shared.emit(SessionEvent::Elapsed(elapsed)),
                        None => break,
                    },
                    Ok(RecorderEvent::Stopped {
                        reason: StopReason::HardStop,
                        ..
                    }) => {
                        if let Some(shared) = weak.upgrade() {
                            SessionLifecycle { shared }.finish_recording();
                        }
                        break;
                    }
                    Ok(RecorderEvent::Stopped { .. }) => break,
                    Ok(RecorderEvent::Started { .. }) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Recorder watch skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Move a hard-stopped take into review
    fn finish_recording(&self) {
        let mut session = self.lock();
        if session.state != SessionState::Recording {
            return;
        }

        let clip = session.recorder.as_ref().and_then(ClipRecorder::clip);
        match clip {
            Some(clip) => {
                if let Err(e) = self.shared.enter_review(&mut session, clip) {
                    tracing::error!("Could not enter review after hard-stop: {}", e);
                }
            }
            None => tracing::error!("Hard-stop reported without a clip"),
        }
    }

    /// Stop the take and switch to the preview
    pub fn stop_recording(&self) -> CaptureResult<Clip> {
        let mut session = self.lock();
        session.require(SessionState::Recording, "stop recording")?;

        let recorder = session
            .recorder
            .clone()
            .ok_or(CaptureError::NoActiveDevice)?;
        let clip = recorder.stop()?;
        self.shared.enter_review(&mut session, clip.clone())?;
        Ok(clip)
    }

    /// Discard the clip and go back to the live camera
    pub async fn retake(&self) -> CaptureResult<()> {
        {
            let mut session = self.lock();
            session.require(SessionState::Reviewing, "retake")?;

            if let Some(mut preview) = session.preview.take() {
                preview.revoke();
            }
            session.clip = None;
            session.recorder = None;
            if let Some(scope) = session.take_scope.take() {
                scope.cancel();
            }
            session.device.release();
            self.shared
                .transition(&mut session, SessionState::CameraInitializing)?;
        }

        self.initialize_camera().await
    }

    pub fn toggle_playback(&self) -> CaptureResult<PlaybackState> {
        self.with_preview("toggle playback", |p| p.toggle_playback())
    }

    pub fn seek(&self, seconds: f64) -> CaptureResult<f64> {
        self.with_preview("seek", |p| p.seek(seconds))
    }

    pub fn current_time(&self) -> CaptureResult<f64> {
        self.with_preview("read playback position", |p| p.current_time())
    }

    /// Duration of the clip under review
    pub fn resolved_duration(&self) -> CaptureResult<f64> {
        self.with_preview("resolve duration", |p| p.resolved_duration())
    }

    fn with_preview<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&PreviewController) -> T,
    ) -> CaptureResult<T> {
        let session = self.lock();
        session.require(SessionState::Reviewing, operation)?;
        session
            .preview
            .as_ref()
            .map(f)
            .ok_or(CaptureError::InvalidState {
                operation,
                state: "reviewing without preview".to_string(),
            })
    }

    /// Publish the clip under review and start following its moderation.
    ///
    /// On failure the session returns to review with the clip intact.
    pub async fn submit(&self) -> CaptureResult<ModerationTicket> {
        let (clip, target) = {
            let mut session = self.lock();
            session.require(SessionState::Reviewing, "submit")?;

            let clip = session.clip.clone().ok_or(CaptureError::InvalidState {
                operation: "submit",
                state: "reviewing without clip".to_string(),
            })?;
            let duration = session
                .preview
                .as_ref()
                .map(PreviewController::resolved_duration)
                .unwrap_or_else(|| clip.elapsed_secs());

            if let Some(mut preview) = session.preview.take() {
                preview.revoke();
            }
            self.shared.transition(&mut session, SessionState::Uploading)?;
            (clip, UploadTarget::new(self.shared.parent.clone(), duration))
        };

        let result = self.shared.submitter.submit(&clip, &target).await;

        let mut session = self.lock();
        if session.state != SessionState::Uploading {
            if let Ok(ticket) = &result {
                tracing::info!("Session closed during upload; not polling {}", ticket);
            }
            return Err(CaptureError::SessionClosed);
        }

        match result {
            Ok(ticket) => {
                session.device.release();
                session.clip = None;
                session.ticket = Some(ticket.clone());

                self.shared.transition(&mut session, SessionState::Polling)?;
                let token = self.shared.poll_scope.child_token();
                session.poll = Some(self.spawn_poll(ticket.clone(), token));
                Ok(ticket)
            }
            Err(e) => {
                session.preview = Some(PreviewController::open(self.shared.surface.clone(), &clip));
                self.shared.transition(&mut session, SessionState::Reviewing)?;
                self.shared.emit(SessionEvent::UploadFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn spawn_poll(&self, ticket: ModerationTicket, token: CancellationToken) -> PollHandle {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let polled = ticket.clone();
        self.shared.poller.spawn_with(ticket, token, move |outcome| {
            if let Some(shared) = weak.upgrade() {
                SessionLifecycle { shared }.finish_polling(polled, outcome);
            }
        })
    }

    fn finish_polling(&self, ticket: ModerationTicket, outcome: PollOutcome) {
        let mut session = self.lock();
        if session.state != SessionState::Polling {
            return;
        }

        match outcome {
            PollOutcome::Verdict { verdict } => {
                self.shared
                    .emit(SessionEvent::VerdictReached { ticket, verdict });
            }
            PollOutcome::Gone => self.shared.emit(SessionEvent::TargetGone { ticket }),
            PollOutcome::TimedOut | PollOutcome::Cancelled => {}
        }
        self.shared.close(&mut session, "moderation polling finished");
    }

    /// Close the surface. Safe from any state, any number of times.
    pub fn close(&self) {
        let mut session = self.lock();
        self.shared.close(&mut session, "closed");
    }
}
