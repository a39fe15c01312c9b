//! Clip recorder
//!
//! Drives one `idle → recording → stopped` take over a live stream.
//! Data is drained from the platform recorder on a fixed flush interval and
//! the take is cut off by a hard-stop timer. Both timers are bound to
//! cancellation tokens derived from the owning session's recording scope.
//!
//! Events (`subscribe`):
//! - `Started` once, after the platform recorder started;
//! - `Tick` after every flush while recording, carrying the tick-derived
//!   elapsed time;
//! - `Stopped` exactly once per take, whichever of the user, the hard-stop
//!   timer, or a discard ends it.

use crate::capture::{CodecDescriptor, MediaDevices, MediaRecorder, StreamHandle};
use crate::utils::error::{CaptureError, CaptureResult};
use crate::utils::timer::{spawn_cancellable, CancellationToken};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Timing limits for a take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Hard-stop ceiling
    pub max_duration: Duration,
    /// How often data is drained from the platform recorder
    pub flush_interval: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(30),
            flush_interval: Duration::from_millis(100),
        }
    }
}

/// Why a take ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// Stopped by the user
    User,
    /// Maximum duration reached
    HardStop,
    /// Torn down without producing a clip
    Discarded,
}

/// Lifecycle of a single take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderPhase {
    Idle,
    Recording,
    Stopped,
}

/// Events emitted by the recorder
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    Started { mime_type: String },
    Tick { elapsed: Duration },
    Stopped { reason: StopReason, elapsed: Duration },
}

/// An immutable recorded clip
#[derive(Debug, Clone)]
pub struct Clip {
    data: Arc<[u8]>,
    codec: CodecDescriptor,
    elapsed: Duration,
    chunk_count: usize,
    recorded_at: DateTime<Utc>,
}

impl Clip {
    pub fn new(data: impl Into<Arc<[u8]>>, codec: CodecDescriptor, elapsed: Duration) -> Self {
        Self {
            data: data.into(),
            codec,
            elapsed,
            chunk_count: 1,
            recorded_at: Utc::now(),
        }
    }

    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn mime_type(&self) -> String {
        self.codec.mime_type()
    }

    pub fn codec(&self) -> &CodecDescriptor {
        &self.codec
    }

    /// Duration measured by the flush ticks
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Number of non-empty chunks the clip was assembled from
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

struct RecorderInner {
    phase: RecorderPhase,
    backend: Option<Box<dyn MediaRecorder>>,
    codec: Option<CodecDescriptor>,
    chunks: Vec<Vec<u8>>,
    ticks: u32,
    started: Option<Instant>,
    clip: Option<Clip>,
    hard_stop: Option<CancellationToken>,
    flush: Option<CancellationToken>,
}

impl RecorderInner {
    /// Flush ticks that are due, counting one whose timer has not run yet
    fn due_ticks(&self, config: &RecorderConfig) -> u32 {
        let Some(started) = self.started else {
            return self.ticks;
        };
        let period = config.flush_interval.as_nanos().max(1);
        let ceiling = config.max_duration.as_nanos() / period;
        let due = (started.elapsed().as_nanos() / period).min(ceiling);
        self.ticks.max(u32::try_from(due).unwrap_or(u32::MAX))
    }

    fn cancel_timers(&mut self) {
        // Hard-stop first so a concurrent timer-initiated stop cannot fire
        if let Some(token) = self.hard_stop.take() {
            token.cancel();
        }
        if let Some(token) = self.flush.take() {
            token.cancel();
        }
    }
}

struct RecorderShared {
    state: Mutex<RecorderInner>,
    config: RecorderConfig,
    scope: CancellationToken,
    devices: Arc<dyn MediaDevices>,
    events: broadcast::Sender<RecorderEvent>,
}

impl Drop for RecorderShared {
    fn drop(&mut self) {
        let inner = self.state.get_mut();
        inner.cancel_timers();
        if let Some(mut backend) = inner.backend.take() {
            backend.stop();
            tracing::warn!("Recorder dropped while recording; take discarded");
        }
    }
}

/// Records a single take. Cheap to clone; clones share the take.
#[derive(Clone)]
pub struct ClipRecorder {
    shared: Arc<RecorderShared>,
}

impl ClipRecorder {
    /// Create an idle recorder whose timers live under `scope`
    pub fn new(devices: Arc<dyn MediaDevices>, config: RecorderConfig, scope: CancellationToken) -> Self {
        let (events, _) = broadcast::channel(128);
        Self {
            shared: Arc::new(RecorderShared {
                state: Mutex::new(RecorderInner {
                    phase: RecorderPhase::Idle,
                    backend: None,
                    codec: None,
                    chunks: Vec::new(),
                    ticks: 0,
                    started: None,
                    clip: None,
                    hard_stop: None,
                    flush: None,
                }),
                config,
                scope,
                devices,
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.shared.events.subscribe()
    }

    pub fn phase(&self) -> RecorderPhase {
        self.shared.state.lock().phase
    }

    /// Tick-derived elapsed time of the current take
    pub fn elapsed(&self) -> Duration {
        let inner = self.shared.state.lock();
        let ticks = match inner.phase {
            RecorderPhase::Recording => inner.due_ticks(&self.shared.config),
            _ => inner.ticks,
        };
        self.shared.config.flush_interval * ticks
    }

    /// The assembled clip, once stopped
    pub fn clip(&self) -> Option<Clip> {
        self.shared.state.lock().clip.clone()
    }

    /// Begin recording `stream` into `codec`.
    pub fn start(&self, stream: Option<&StreamHandle>, codec: &CodecDescriptor) -> CaptureResult<()> {
        let stream = match stream {
            Some(stream) if stream.is_live() => stream,
            _ => {
                tracing::error!("Recording requested without a live capture stream");
                return Err(CaptureError::NoActiveDevice);
            }
        };

        let mime_type = codec.mime_type();
        let (hard_stop, flush) = {
            let mut inner = self.shared.state.lock();
            if inner.phase != RecorderPhase::Idle {
                return Err(CaptureError::InvalidState {
                    operation: "start recording",
                    state: format!("{:?}", inner.phase).to_lowercase(),
                });
            }

            let mut backend = self
                .shared
                .devices
                .create_recorder(stream.tracks(), &mime_type)
                .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
            backend
                .start()
                .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

            let hard_stop = self.shared.scope.child_token();
            let flush = self.shared.scope.child_token();

            inner.phase = RecorderPhase::Recording;
            inner.started = Some(Instant::now());
            inner.backend = Some(backend);
            inner.codec = Some(codec.clone());
            inner.hard_stop = Some(hard_stop.clone());
            inner.flush = Some(flush.clone());
            (hard_stop, flush)
        };

        self.spawn_flush(flush);
        self.spawn_hard_stop(hard_stop);

        tracing::info!(
            "Recording started on stream {} ({}, max {:?})",
            stream.id(),
            mime_type,
            self.shared.config.max_duration
        );
        let _ = self.shared.events.send(RecorderEvent::Started { mime_type });
        Ok(())
    }

    fn spawn_flush(&self, token: CancellationToken) {
        let weak = Arc::downgrade(&self.shared);
        let period = self.shared.config.flush_interval;
        spawn_cancellable(token, async move {
            let start = Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                match weak.upgrade() {
                    Some(shared) => ClipRecorder { shared }.flush_tick(),
                    None => break,
                }
            }
        });
    }

    fn spawn_hard_stop(&self, token: CancellationToken) {
        let weak: Weak<RecorderShared> = Arc::downgrade(&self.shared);
        let ceiling = self.shared.config.max_duration;
        spawn_cancellable(token, async move {
            tokio::time::sleep(ceiling).await;
            if let Some(shared) = weak.upgrade() {
                tracing::info!("Hard-stop reached after {:?}", ceiling);
                if let Err(e) = (ClipRecorder { shared }).stop_with(StopReason::HardStop) {
                    tracing::warn!("Hard-stop failed: {}", e);
                }
            }
        });
    }

    fn flush_tick(&self) {
        let elapsed = {
            let mut inner = self.shared.state.lock();
            if inner.phase != RecorderPhase::Recording {
                return;
            }
            if let Some(backend) = inner.backend.as_mut() {
                let data = backend.request_data();
                if !data.is_empty() {
                    inner.chunks.push(data);
                }
            }
            inner.ticks += 1;
            self.shared.config.flush_interval * inner.ticks
        };

        tracing::trace!("Flush tick, elapsed {:?}", elapsed);
        let _ = self.shared.events.send(RecorderEvent::Tick { elapsed });
    }

    /// Stop the take at the user's request
    pub fn stop(&self) -> CaptureResult<Clip> {
        self.stop_with(StopReason::User)
    }

    /// Stop the take and assemble the clip.
    ///
    /// Stopping an already stopped take returns the same clip and emits
    /// nothing.
    pub fn stop_with(&self, reason: StopReason) -> CaptureResult<Clip> {
        let (clip, elapsed) = {
            let mut inner = self.shared.state.lock();
            match inner.phase {
                RecorderPhase::Idle => {
                    return Err(CaptureError::InvalidState {
                        operation: "stop recording",
                        state: "idle".to_string(),
                    })
                }
                RecorderPhase::Stopped => {
                    return inner.clip.clone().ok_or(CaptureError::InvalidState {
                        operation: "stop recording",
                        state: "discarded".to_string(),
                    })
                }
                RecorderPhase::Recording => {}
            }

            inner.cancel_timers();
            inner.ticks = inner.due_ticks(&self.shared.config);
            let codec = match inner.codec.clone() {
                Some(codec) => codec,
                None => return Err(CaptureError::NoActiveDevice),
            };

            if let Some(mut backend) = inner.backend.take() {
                let tail = backend.stop();
                if !tail.is_empty() {
                    inner.chunks.push(tail);
                }
            }

            let chunks = std::mem::take(&mut inner.chunks);
            let elapsed = self.shared.config.flush_interval * inner.ticks;
            let clip = Clip {
                chunk_count: chunks.len(),
                ..Clip::new(chunks.concat(), codec, elapsed)
            };
            inner.clip = Some(clip.clone());
            inner.phase = RecorderPhase::Stopped;
            (clip, elapsed)
        };

        tracing::info!(
            "Recording stopped ({:?}): {:?}, {} bytes in {} chunks",
            reason,
            elapsed,
            clip.len(),
            clip.chunk_count()
        );
        let _ = self.shared.events.send(RecorderEvent::Stopped { reason, elapsed });
        Ok(clip)
    }

    /// Tear down the take without producing a clip
    pub fn discard(&self) {
        let elapsed = {
            let mut inner = self.shared.state.lock();
            if inner.phase != RecorderPhase::Recording {
                inner.cancel_timers();
                return;
            }
            inner.cancel_timers();
            inner.ticks = inner.due_ticks(&self.shared.config);
            if let Some(mut backend) = inner.backend.take() {
                backend.stop();
            }
            inner.chunks.clear();
            inner.phase = RecorderPhase::Stopped;
            self.shared.config.flush_interval * inner.ticks
        };

        tracing::info!("Recording discarded after {:?}", elapsed);
        let _ = self.shared.events.send(RecorderEvent::Stopped {
            reason: StopReason::Discarded,
            elapsed,
        });
    }
}
