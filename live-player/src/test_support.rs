//! In-memory stand-ins for the backend, the live socket and the video element

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use bytes::Bytes;
use common::{CameraId, CameraStreamConfig};
use tokio::sync::mpsc;
use url::Url;
use crate::api::{CameraApi, ReadyAnswer};
use crate::errors::{ApiError, MediaError, TransportError};
use crate::media::{container_of, BufferEvent, MediaBuffer, VideoEvent, VideoSurface};
use crate::socket::{SegmentSocket, SocketConnector, SocketMessage};

/// Backend with queued answers. An empty readiness queue answers 503 forever.
#[derive(Default)]
pub struct ScriptedApi {
    ready: Mutex<VecDeque<Result<ReadyAnswer, ApiError>>>,
    cameras: Mutex<VecDeque<Result<CameraStreamConfig, ApiError>>>,
    listing: Mutex<Vec<CameraStreamConfig>>,
    ready_calls: AtomicU32,
    camera_calls: AtomicU32,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ready(&self, answer: Result<ReadyAnswer, ApiError>) {
        self.ready.lock().unwrap().push_back(answer);
    }

    pub fn push_not_ready(&self, times: usize) {
        for _ in 0..times {
            self.push_ready(Ok(ReadyAnswer::NotReady { status: 503 }));
        }
    }

    pub fn push_publishable(&self, config: CameraStreamConfig) {
        self.push_ready(Ok(ReadyAnswer::Ready(config)));
    }

    pub fn push_camera(&self, answer: Result<CameraStreamConfig, ApiError>) {
        self.cameras.lock().unwrap().push_back(answer);
    }

    pub fn set_listing(&self, cameras: Vec<CameraStreamConfig>) {
        *self.listing.lock().unwrap() = cameras;
    }

    pub fn ready_calls(&self) -> u32 {
        self.ready_calls.load(Ordering::SeqCst)
    }

    pub fn camera_calls(&self) -> u32 {
        self.camera_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraApi for ScriptedApi {
    async fn list_cameras(&self) -> Result<Vec<CameraStreamConfig>, ApiError> {
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn check_ready(&self, _id: CameraId) -> Result<ReadyAnswer, ApiError> {
        self.ready_calls.fetch_add(1, Ordering::SeqCst);
        self.ready
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ReadyAnswer::NotReady { status: 503 }))
    }

    async fn fetch_camera(&self, _id: CameraId) -> Result<CameraStreamConfig, ApiError> {
        self.camera_calls.fetch_add(1, Ordering::SeqCst);
        self.cameras.lock().unwrap().pop_front().unwrap_or(Err(ApiError::Network {
            message: "no scripted answer".to_string(),
        }))
    }
}

/// Observable calls, in the order they happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Request,
    Append(Bytes),
    AppendDone,
    EndOfStream,
    SocketClosed,
}

#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Op>>>);

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, op: Op) {
        self.0.lock().unwrap().push(op);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, op: &Op) -> usize {
        self.ops().iter().filter(|o| *o == op).count()
    }
}

struct BufferShared {
    appends: Vec<Bytes>,
    end_calls: u32,
    fail_appends: Option<String>,
}

/// Media buffer whose completions are either immediate or released by hand
pub struct FakeBuffer {
    shared: Arc<Mutex<BufferShared>>,
    events_tx: mpsc::UnboundedSender<BufferEvent>,
    events_rx: mpsc::UnboundedReceiver<BufferEvent>,
    auto_complete: bool,
    updating: bool,
    ended: bool,
    recorder: Recorder,
}

#[derive(Clone)]
pub struct BufferControl {
    shared: Arc<Mutex<BufferShared>>,
    events_tx: mpsc::UnboundedSender<BufferEvent>,
}

impl FakeBuffer {
    pub fn manual() -> (Self, BufferControl) {
        Self::build(false, Recorder::new())
    }

    pub fn auto() -> (Self, BufferControl) {
        Self::build(true, Recorder::new())
    }

    pub fn recorded(auto_complete: bool, recorder: Recorder) -> (Self, BufferControl) {
        Self::build(auto_complete, recorder)
    }

    fn build(auto_complete: bool, recorder: Recorder) -> (Self, BufferControl) {
        let shared = Arc::new(Mutex::new(BufferShared {
            appends: Vec::new(),
            end_calls: 0,
            fail_appends: None,
        }));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let control = BufferControl {
            shared: shared.clone(),
            events_tx: events_tx.clone(),
        };
        let buffer = Self {
            shared,
            events_tx,
            events_rx,
            auto_complete,
            updating: false,
            ended: false,
            recorder,
        };
        (buffer, control)
    }
}

#[async_trait]
impl MediaBuffer for FakeBuffer {
    fn begin_append(&mut self, chunk: Bytes) -> Result<(), MediaError> {
        if self.updating || self.ended {
            return Err(MediaError::InvalidState {
                reason: "append while updating or ended".to_string(),
            });
        }
        let mut shared = self.shared.lock().unwrap();
        if let Some(message) = shared.fail_appends.clone() {
            return Err(MediaError::SourceBuffer { message });
        }
        shared.appends.push(chunk.clone());
        self.recorder.record(Op::Append(chunk));
        self.updating = true;
        if self.auto_complete {
            let _ = self.events_tx.send(BufferEvent::UpdateEnd);
        }
        Ok(())
    }

    fn is_updating(&self) -> bool {
        self.updating
    }

    async fn next_event(&mut self) -> Option<BufferEvent> {
        let event = self.events_rx.recv().await?;
        if event == BufferEvent::UpdateEnd {
            self.updating = false;
            self.recorder.record(Op::AppendDone);
        }
        Some(event)
    }

    fn end_of_stream(&mut self) -> Result<(), MediaError> {
        self.ended = true;
        self.shared.lock().unwrap().end_calls += 1;
        self.recorder.record(Op::EndOfStream);
        Ok(())
    }
}

impl BufferControl {
    pub fn appends(&self) -> Vec<Bytes> {
        self.shared.lock().unwrap().appends.clone()
    }

    pub fn end_calls(&self) -> u32 {
        self.shared.lock().unwrap().end_calls
    }

    /// Completes the running append
    pub fn complete(&self) {
        let _ = self.events_tx.send(BufferEvent::UpdateEnd);
    }

    pub fn fail(&self, message: &str) {
        let _ = self.events_tx.send(BufferEvent::Error(message.to_string()));
    }

    pub fn fail_appends(&self, message: &str) {
        self.shared.lock().unwrap().fail_appends = Some(message.to_string());
    }
}

/// What the fake server answers to one `"next"`
#[derive(Debug, Clone)]
pub enum SocketStep {
    Segment(Bytes),
    End,
    /// Close frame from the server
    Close,
    Error(String),
}

impl SocketStep {
    pub fn segment(data: &'static [u8]) -> Self {
        SocketStep::Segment(Bytes::from_static(data))
    }
}

#[derive(Default)]
pub struct SocketStats {
    connects: AtomicU32,
    requests: AtomicU32,
    closes: AtomicU32,
}

impl SocketStats {
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Hands out sockets that answer each request with the next scripted step
pub struct FakeConnector {
    steps: Vec<SocketStep>,
    refuse: Option<String>,
    stats: Arc<SocketStats>,
    recorder: Recorder,
}

impl FakeConnector {
    pub fn new(steps: Vec<SocketStep>, recorder: Recorder) -> Self {
        Self {
            steps,
            refuse: None,
            stats: Arc::new(SocketStats::default()),
            recorder,
        }
    }

    pub fn refusing(reason: &str) -> Self {
        let mut connector = Self::new(Vec::new(), Recorder::new());
        connector.refuse = Some(reason.to_string());
        connector
    }

    pub fn stats(&self) -> Arc<SocketStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl SocketConnector for FakeConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn SegmentSocket>, TransportError> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.refuse {
            return Err(TransportError::ConnectionFailed {
                url: url.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(Box::new(FakeSocket {
            steps: self.steps.clone().into(),
            pending: 0,
            stats: self.stats.clone(),
            recorder: self.recorder.clone(),
        }))
    }
}

struct FakeSocket {
    steps: VecDeque<SocketStep>,
    pending: u32,
    stats: Arc<SocketStats>,
    recorder: Recorder,
}

#[async_trait]
impl SegmentSocket for FakeSocket {
    async fn request_next(&mut self) -> Result<(), TransportError> {
        self.stats.requests.fetch_add(1, Ordering::SeqCst);
        self.recorder.record(Op::Request);
        self.pending += 1;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<SocketMessage, TransportError>> {
        if self.pending == 0 || self.steps.is_empty() {
            return futures::future::pending().await;
        }
        self.pending -= 1;
        match self.steps.pop_front()? {
            SocketStep::Segment(data) => Some(Ok(SocketMessage::Segment(data))),
            SocketStep::End => Some(Ok(SocketMessage::EndOfStream)),
            SocketStep::Close => Some(Err(TransportError::ConnectionClosed {
                code: Some(1000),
                reason: String::new(),
            })),
            SocketStep::Error(reason) => Some(Err(TransportError::Socket { reason })),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        self.recorder.record(Op::SocketClosed);
        Ok(())
    }
}

struct SurfaceShared {
    sources: Vec<Url>,
    releases: u32,
    buffer: Option<FakeBuffer>,
    opened_mime: Vec<String>,
}

/// Video element driven from the test through a `SurfaceControl`
pub struct FakeSurface {
    shared: Arc<Mutex<SurfaceShared>>,
    events_rx: mpsc::UnboundedReceiver<VideoEvent>,
}

#[derive(Clone)]
pub struct SurfaceControl {
    shared: Arc<Mutex<SurfaceShared>>,
    events_tx: mpsc::UnboundedSender<VideoEvent>,
}

impl FakeSurface {
    pub fn new() -> (Self, SurfaceControl) {
        let shared = Arc::new(Mutex::new(SurfaceShared {
            sources: Vec::new(),
            releases: 0,
            buffer: None,
            opened_mime: Vec::new(),
        }));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let surface = Self {
            shared: shared.clone(),
            events_rx,
        };
        (surface, SurfaceControl { shared, events_tx })
    }

    /// Surface whose media source hands out `buffer`
    pub fn with_buffer(buffer: FakeBuffer) -> (Self, SurfaceControl) {
        let (surface, control) = Self::new();
        control.shared.lock().unwrap().buffer = Some(buffer);
        (surface, control)
    }
}

#[async_trait]
impl VideoSurface for FakeSurface {
    async fn load_playlist(&mut self, url: &Url) -> Result<(), MediaError> {
        self.shared.lock().unwrap().sources.push(url.clone());
        Ok(())
    }

    async fn next_event(&mut self) -> Option<VideoEvent> {
        self.events_rx.recv().await
    }

    async fn open_media_source(&mut self, mime_codec: &str) -> Result<Box<dyn MediaBuffer>, MediaError> {
        let mut shared = self.shared.lock().unwrap();
        shared.opened_mime.push(mime_codec.to_string());
        if container_of(mime_codec) != "video/mp4" {
            return Err(MediaError::UnsupportedMimeType {
                mime: mime_codec.to_string(),
            });
        }
        match shared.buffer.take() {
            Some(buffer) => Ok(Box::new(buffer)),
            None => Err(MediaError::MediaSource {
                message: "media source already opened".to_string(),
            }),
        }
    }

    async fn release(&mut self) {
        self.shared.lock().unwrap().releases += 1;
    }
}

impl SurfaceControl {
    pub fn sources(&self) -> Vec<Url> {
        self.shared.lock().unwrap().sources.clone()
    }

    pub fn releases(&self) -> u32 {
        self.shared.lock().unwrap().releases
    }

    pub fn opened_mime(&self) -> Vec<String> {
        self.shared.lock().unwrap().opened_mime.clone()
    }

    pub fn emit(&self, event: VideoEvent) {
        let _ = self.events_tx.send(event);
    }
}
