//! In-memory platform and network fakes for tests

use crate::capture::{
    CodecDescriptor, DeviceError, MediaDevices, MediaRecorder, MediaTrack, PlaybackSurface,
    TrackKind, VideoConstraints,
};
use crate::publish::{FormPart, HttpResponse, HttpTransport};
use crate::recorder::{Clip, RecorderEvent, StopReason};
use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Bytes produced by a fake recorder per drain
pub const CHUNK_SIZE: usize = 64;

/// Camera acquire/release log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Acquire(String),
    Release(String),
}

#[derive(Default)]
struct DevicesState {
    supported: Option<HashSet<String>>,
    camera_denied: bool,
    microphone_missing: bool,
    open_delay: Option<Duration>,
    cameras_opened: usize,
    microphones_opened: usize,
    cameras_released: usize,
    live: HashSet<String>,
    calls: Vec<DeviceCall>,
}

/// Fake capture API. Supports every MIME type unless told otherwise.
pub struct FakeDevices {
    state: Mutex<DevicesState>,
    recorders_created: AtomicUsize,
    active_recorders: Arc<AtomicUsize>,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DevicesState::default()),
            recorders_created: AtomicUsize::new(0),
            active_recorders: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_supported(&self, mime_types: &[&str]) {
        self.state.lock().supported = Some(mime_types.iter().map(|m| m.to_string()).collect());
    }

    pub fn deny_camera(&self) {
        self.state.lock().camera_denied = true;
    }

    pub fn allow_camera(&self) {
        self.state.lock().camera_denied = false;
    }

    pub fn remove_microphone(&self) {
        self.state.lock().microphone_missing = true;
    }

    pub fn set_open_delay(&self, delay: Duration) {
        self.state.lock().open_delay = Some(delay);
    }

    /// Successful camera opens
    pub fn acquired(&self) -> usize {
        self.state.lock().cameras_opened
    }

    /// Camera tracks stopped while live
    pub fn released(&self) -> usize {
        self.state.lock().cameras_released
    }

    /// Tracks of either kind that are still running
    pub fn live_tracks(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().calls.clone()
    }

    pub fn recorders_created(&self) -> usize {
        self.recorders_created.load(Ordering::SeqCst)
    }

    /// Recorders started and not yet stopped
    pub fn active_recorders(&self) -> usize {
        self.active_recorders.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        let delay = self.state.lock().open_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn open_camera(&self, _constraints: &VideoConstraints) -> Result<MediaTrack, DeviceError> {
        self.delay().await;

        let mut state = self.state.lock();
        if state.camera_denied {
            return Err(DeviceError::PermissionDenied("camera".to_string()));
        }
        state.cameras_opened += 1;
        let id = format!("cam-{}", state.cameras_opened);
        state.live.insert(id.clone());
        state.calls.push(DeviceCall::Acquire(id.clone()));
        Ok(MediaTrack {
            id,
            kind: TrackKind::Video,
            label: "Front Camera".to_string(),
        })
    }

    async fn open_microphone(&self) -> Result<MediaTrack, DeviceError> {
        self.delay().await;

        let mut state = self.state.lock();
        if state.microphone_missing {
            return Err(DeviceError::NotFound("microphone".to_string()));
        }
        state.microphones_opened += 1;
        let id = format!("mic-{}", state.microphones_opened);
        state.live.insert(id.clone());
        Ok(MediaTrack {
            id,
            kind: TrackKind::Audio,
            label: "Built-in Microphone".to_string(),
        })
    }

    fn stop_track(&self, track: &MediaTrack) {
        let mut state = self.state.lock();
        if state.live.remove(&track.id) && track.kind == TrackKind::Video {
            state.cameras_released += 1;
            state.calls.push(DeviceCall::Release(track.id.clone()));
        }
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        match &self.state.lock().supported {
            Some(supported) => supported.contains(mime_type),
            None => true,
        }
    }

    fn create_recorder(
        &self,
        tracks: &[MediaTrack],
        _mime_type: &str,
    ) -> Result<Box<dyn MediaRecorder>, DeviceError> {
        let state = self.state.lock();
        if tracks.iter().any(|t| !state.live.contains(&t.id)) {
            return Err(DeviceError::Recorder("track ended".to_string()));
        }
        self.recorders_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeRecorder {
            running: false,
            active: self.active_recorders.clone(),
        }))
    }
}

struct FakeRecorder {
    running: bool,
    active: Arc<AtomicUsize>,
}

impl MediaRecorder for FakeRecorder {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.running = true;
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn request_data(&mut self) -> Vec<u8> {
        if self.running {
            vec![0u8; CHUNK_SIZE]
        } else {
            Vec::new()
        }
    }

    fn stop(&mut self) -> Vec<u8> {
        if !self.running {
            return Vec::new();
        }
        self.running = false;
        self.active.fetch_sub(1, Ordering::SeqCst);
        vec![0u8; CHUNK_SIZE]
    }
}

struct SurfaceState {
    next_url: usize,
    live: HashSet<String>,
    created: usize,
    revoked: usize,
    loaded: Option<String>,
    looping: bool,
    paused: bool,
    position: f64,
    reported_duration: f64,
}

/// Fake video element with object URL bookkeeping
pub struct FakeSurface {
    state: Mutex<SurfaceState>,
}

impl FakeSurface {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SurfaceState {
                next_url: 0,
                live: HashSet::new(),
                created: 0,
                revoked: 0,
                loaded: None,
                looping: false,
                paused: true,
                position: 0.0,
                reported_duration: f64::NAN,
            }),
        }
    }

    pub fn set_reported_duration(&self, seconds: f64) {
        self.state.lock().reported_duration = seconds;
    }

    pub fn is_looping(&self) -> bool {
        self.state.lock().looping
    }

    pub fn created(&self) -> usize {
        self.state.lock().created
    }

    pub fn revoked(&self) -> usize {
        self.state.lock().revoked
    }

    pub fn live_urls(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn is_live_url(&self, url: &str) -> bool {
        self.state.lock().live.contains(url)
    }
}

impl PlaybackSurface for FakeSurface {
    fn create_object_url(&self, _data: &Arc<[u8]>, _mime_type: &str) -> String {
        let mut state = self.state.lock();
        state.next_url += 1;
        state.created += 1;
        let url = format!("blob:fake/{}", state.next_url);
        state.live.insert(url.clone());
        url
    }

    fn revoke_object_url(&self, url: &str) {
        let mut state = self.state.lock();
        if state.live.remove(url) {
            state.revoked += 1;
        }
    }

    fn load(&self, url: &str, looping: bool) {
        let mut state = self.state.lock();
        state.loaded = Some(url.to_string());
        state.looping = looping;
        state.position = 0.0;
    }

    fn unload(&self) {
        let mut state = self.state.lock();
        state.loaded = None;
        state.looping = false;
    }

    fn play(&self) {
        let mut state = self.state.lock();
        state.paused = state.loaded.is_none();
    }

    fn pause(&self) {
        self.state.lock().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn seek(&self, seconds: f64) {
        self.state.lock().position = seconds;
    }

    fn current_time(&self) -> f64 {
        self.state.lock().position
    }

    fn reported_duration(&self) -> f64 {
        self.state.lock().reported_duration
    }
}

/// A multipart request captured by `FakeTransport`
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub url: String,
    pub parts: Vec<FormPart>,
}

impl RecordedUpload {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            FormPart::Text { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn file_len(&self, name: &str) -> Option<usize> {
        self.parts.iter().find_map(|part| match part {
            FormPart::File { name: n, data, .. } if n == name => Some(data.len()),
            _ => None,
        })
    }

    pub fn file_name(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            FormPart::File {
                name: n, file_name, ..
            } if n == name => Some(file_name.as_str()),
            _ => None,
        })
    }
}

type Scripted = Result<HttpResponse, String>;

#[derive(Default)]
struct TransportState {
    uploads: Vec<RecordedUpload>,
    upload_script: VecDeque<Scripted>,
    upload_delay: Option<Duration>,
    status_urls: Vec<String>,
    status_script: VecDeque<Scripted>,
}

/// Scripted HTTP backend.
///
/// Unscripted uploads answer `201 {"id":"T1"}`; unscripted status requests
/// answer `200 {"status":"pending"}`.
pub struct FakeTransport {
    state: Mutex<TransportState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TransportState::default()),
        }
    }

    pub fn push_upload(&self, status: u16, body: &str) {
        self.state
            .lock()
            .upload_script
            .push_back(Ok(HttpResponse::new(status, body.as_bytes().to_vec())));
    }

    pub fn fail_next_upload(&self, message: &str) {
        self.state
            .lock()
            .upload_script
            .push_back(Err(message.to_string()));
    }

    pub fn set_upload_delay(&self, delay: Duration) {
        self.state.lock().upload_delay = Some(delay);
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.state.lock().uploads.clone()
    }

    pub fn push_status(&self, status: u16, body: &str) {
        self.state
            .lock()
            .status_script
            .push_back(Ok(HttpResponse::new(status, body.as_bytes().to_vec())));
    }

    pub fn fail_next_status(&self, message: &str) {
        self.state
            .lock()
            .status_script
            .push_back(Err(message.to_string()));
    }

    pub fn status_requests(&self) -> usize {
        self.state.lock().status_urls.len()
    }

    pub fn status_urls(&self) -> Vec<String> {
        self.state.lock().status_urls.clone()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn post_multipart(&self, url: &str, parts: Vec<FormPart>) -> anyhow::Result<HttpResponse> {
        let (scripted, delay) = {
            let mut state = self.state.lock();
            state.uploads.push(RecordedUpload {
                url: url.to_string(),
                parts,
            });
            (state.upload_script.pop_front(), state.upload_delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match scripted {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(HttpResponse::new(201, br#"{"id":"T1"}"#.to_vec())),
        }
    }

    async fn get(&self, url: &str) -> anyhow::Result<HttpResponse> {
        let scripted = {
            let mut state = self.state.lock();
            state.status_urls.push(url.to_string());
            state.status_script.pop_front()
        };

        match scripted {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(HttpResponse::new(200, br#"{"status":"pending"}"#.to_vec())),
        }
    }
}

/// A small webm clip with the given tick-derived duration
pub fn test_clip(elapsed: Duration) -> Clip {
    Clip::new(
        vec![0u8; CHUNK_SIZE * 4],
        CodecDescriptor::new("webm", Some("vp9"), Some("opus")),
        elapsed,
    )
}

/// Collect the stop reasons currently queued on a recorder receiver
pub fn drain_stops(events: &mut broadcast::Receiver<RecorderEvent>) -> Vec<StopReason> {
    let mut stops = Vec::new();
    loop {
        match events.try_recv() {
            Ok(RecorderEvent::Stopped { reason, .. }) => stops.push(reason),
            Ok(_) => {}
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    stops
}
