use std::sync::Arc;
use std::time::Duration;
use common::{CameraId, CameraStreamConfig};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;
use crate::api::{CameraApi, Endpoints};
use crate::buffer_sink::BufferSink;
use crate::config::{PlayerConfig, TransportKind};
use crate::continuation::{PlaylistContinuationClient, PlaylistCursor};
use crate::errors::{ContinuationError, PlayerError, TransportError};
use crate::media::{VideoEvent, VideoSurface};
use crate::readiness::{ReadinessPoller, RetryPolicy};
use crate::segment_stream::{SegmentStreamClient, StreamEvent, StreamHandle, StreamOptions};
use crate::socket::SocketConnector;

/// 播放会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Polling,
    Ready,
    Playing,
    Buffering,
    Error,
    Closed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Error | SessionState::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Polling => "polling",
            SessionState::Ready => "ready",
            SessionState::Playing => "playing",
            SessionState::Buffering => "buffering",
            SessionState::Error => "error",
            SessionState::Closed => "closed",
        }
    }
}

/// 会话事件
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionState),
    ConfigReceived(CameraStreamConfig),
    SourceChanged(Url),
    SegmentAppended { index: u64 },
    /// A continuation fetch failed; playback waits for the next attempt
    Stalled(ContinuationError),
    StreamEnded { segments: u64 },
    Failed(PlayerError),
}

/// Collaborators shared by every session of a wall
#[derive(Clone)]
pub struct SessionDeps {
    pub api: Arc<dyn CameraApi>,
    pub endpoints: Endpoints,
    pub connector: Arc<dyn SocketConnector>,
}

/// 会话参数
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub transport: TransportKind,
    pub readiness: RetryPolicy,
    pub continuation_retries: u32,
    pub continuation_delay: Duration,
    pub mime_codec: String,
    pub max_segments: Option<u64>,
}

impl SessionOptions {
    pub fn from_config(config: &PlayerConfig) -> Self {
        Self {
            transport: config.stream.transport,
            readiness: RetryPolicy::from(&config.readiness),
            continuation_retries: config.continuation.max_retries,
            continuation_delay: config.continuation.retry_delay,
            mime_codec: config.stream.mime_codec.clone(),
            max_segments: config.stream.max_segments,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&PlayerConfig::default())
    }
}

#[derive(Debug)]
enum SessionCommand {
    RetryContinuation,
}

/// Playlist transport state
struct PlaylistTransport {
    cursor: PlaylistCursor,
    client: PlaylistContinuationClient,
    failures: u32,
    stalled: bool,
    retry_at: Option<Instant>,
}

/// The transport a session committed to after `Ready`
enum Transport {
    Playlist(PlaylistTransport),
    Socket(StreamHandle),
}

impl Transport {
    async fn shutdown(&mut self) {
        if let Transport::Socket(stream) = self {
            stream.close().await;
        }
    }
}

/// One camera tile's playback lifecycle
pub struct PlaybackSession {
    camera_id: CameraId,
    deps: SessionDeps,
    options: SessionOptions,
    surface: Box<dyn VideoSurface>,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    cancel: CancellationToken,
}

impl PlaybackSession {
    /// Starts the session on its own task
    pub fn spawn(
        camera_id: CameraId,
        deps: SessionDeps,
        options: SessionOptions,
        surface: Box<dyn VideoSurface>,
    ) -> SessionHandle {
        let session_id = Uuid::new_v4();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (events_tx, _) = broadcast::channel(64);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let session = PlaybackSession {
            camera_id,
            deps,
            options,
            surface,
            state: state_tx,
            events: events_tx.clone(),
            commands: commands_rx,
            cancel: cancel.clone(),
        };

        let span = info_span!("session", camera_id, %session_id);
        let task = tokio::spawn(session.run().instrument(span));

        SessionHandle {
            camera_id,
            session_id,
            state: state_rx,
            events: events_tx,
            commands: commands_tx,
            cancel,
            task: Some(task),
            outcome: None,
        }
    }

    async fn run(mut self) -> Option<PlayerError> {
        let error = match self.establish().await {
            Ok(()) | Err(PlayerError::Cancelled) => None,
            Err(e) => {
                error!("Session failed: {}", e);
                self.set_state(SessionState::Error);
                self.emit(SessionEvent::Failed(e.clone()));
                self.cancel.cancelled().await;
                Some(e)
            }
        };

        self.surface.release().await;
        self.set_state(SessionState::Closed);
        info!("Session closed");
        error
    }

    async fn establish(&mut self) -> Result<(), PlayerError> {
        self.set_state(SessionState::Polling);

        let mut poller = ReadinessPoller::new(self.deps.api.clone(), self.options.readiness.clone());
        let config = poller.poll(self.camera_id, &self.cancel).await?;
        let playlist = config
            .playlist()
            .map(str::to_string)
            .ok_or(ContinuationError::NoActivePlaylist {
                camera_id: self.camera_id,
            })?;

        self.emit(SessionEvent::ConfigReceived(config));
        self.set_state(SessionState::Ready);

        let mut transport = self.start_transport(playlist).await?;
        let result = self.drive(&mut transport).await;
        transport.shutdown().await;
        result
    }

    async fn start_transport(&mut self, playlist: String) -> Result<Transport, PlayerError> {
        match self.options.transport {
            TransportKind::Playlist => {
                let url = self.deps.endpoints.playlist(&playlist)?;
                self.surface
                    .load_playlist(&url)
                    .await
                    .map_err(TransportError::from)?;
                info!(%url, "Playlist source attached");
                self.emit(SessionEvent::SourceChanged(url));
                self.set_state(SessionState::Playing);

                Ok(Transport::Playlist(PlaylistTransport {
                    cursor: PlaylistCursor::new(playlist),
                    client: PlaylistContinuationClient::new(self.deps.api.clone()),
                    failures: 0,
                    stalled: false,
                    retry_at: None,
                }))
            }
            TransportKind::Socket => {
                let url = self.deps.endpoints.live(self.camera_id)?;
                let buffer = self
                    .surface
                    .open_media_source(&self.options.mime_codec)
                    .await
                    .map_err(TransportError::from)?;

                let client = SegmentStreamClient::new(
                    self.camera_id,
                    url.clone(),
                    self.deps.connector.clone(),
                    StreamOptions {
                        max_segments: self.options.max_segments,
                    },
                );
                let stream = client.start(BufferSink::new(buffer), self.cancel.child_token());
                self.emit(SessionEvent::SourceChanged(url));
                self.set_state(SessionState::Playing);
                Ok(Transport::Socket(stream))
            }
        }
    }

    async fn drive(&mut self, transport: &mut Transport) -> Result<(), PlayerError> {
        match transport {
            Transport::Playlist(playlist) => self.drive_playlist(playlist).await,
            Transport::Socket(stream) => self.drive_socket(stream).await,
        }
    }

    async fn drive_playlist(&mut self, transport: &mut PlaylistTransport) -> Result<(), PlayerError> {
        let mut surface_open = true;
        let mut commands_open = true;

        loop {
            let retry_at = transport.retry_at;
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PlayerError::Cancelled),
                command = self.commands.recv(), if commands_open => match command {
                    Some(SessionCommand::RetryContinuation) if transport.stalled => {
                        info!("Retrying playlist continuation on request");
                        transport.failures = 0;
                        self.continue_playlist(transport).await?;
                    }
                    Some(SessionCommand::RetryContinuation) => {
                        debug!("Ignoring retry, playback is not stalled");
                    }
                    None => commands_open = false,
                },
                _ = sleep_until(retry_at), if retry_at.is_some() => {
                    self.continue_playlist(transport).await?;
                }
                event = self.surface.next_event(), if surface_open => match event {
                    Some(VideoEvent::Playing) => {
                        if !transport.stalled {
                            self.set_state(SessionState::Playing);
                        }
                    }
                    Some(VideoEvent::Ended) => {
                        debug!(playlist = transport.cursor.current(), "Playlist ended");
                        transport.failures = 0;
                        self.continue_playlist(transport).await?;
                    }
                    Some(VideoEvent::Error(message)) => {
                        return Err(TransportError::Player { message }.into());
                    }
                    None => surface_open = false,
                },
            }
        }
    }

    /// Fetches the camera's current playlist and swaps the source to it
    async fn continue_playlist(&mut self, transport: &mut PlaylistTransport) -> Result<(), PlayerError> {
        transport.retry_at = None;
        self.set_state(SessionState::Buffering);

        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PlayerError::Cancelled),
            fetched = transport.client.on_segment_end(self.camera_id) => fetched,
        };

        match fetched {
            Ok(continuation) => {
                transport.failures = 0;
                transport.stalled = false;
                if transport.cursor.advance(&continuation) {
                    let url = self.deps.endpoints.playlist(transport.cursor.current())?;
                    self.surface
                        .load_playlist(&url)
                        .await
                        .map_err(TransportError::from)?;
                    info!(%url, seq = continuation.seq, "Switched to next playlist");
                    self.emit(SessionEvent::ConfigReceived(continuation.config));
                    self.emit(SessionEvent::SourceChanged(url));
                }
                self.set_state(SessionState::Playing);
            }
            Err(e) => {
                transport.failures += 1;
                transport.stalled = true;
                if transport.failures <= self.options.continuation_retries {
                    warn!(attempt = transport.failures, "Playlist continuation failed, retrying: {}", e);
                    transport.retry_at = Some(Instant::now() + self.options.continuation_delay);
                } else {
                    warn!("Playlist continuation failed, playback stalled: {}", e);
                }
                self.emit(SessionEvent::Stalled(e));
            }
        }
        Ok(())
    }

    async fn drive_socket(&mut self, stream: &mut StreamHandle) -> Result<(), PlayerError> {
        let mut stream_open = true;
        let mut surface_open = true;
        let mut commands_open = true;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PlayerError::Cancelled),
                event = stream.next_event(), if stream_open => match event {
                    Some(StreamEvent::Connected) => debug!("Live socket connected"),
                    Some(StreamEvent::Buffering { queued }) => {
                        debug!(queued, "Segment appending");
                        self.set_state(SessionState::Buffering);
                    }
                    Some(StreamEvent::Appended { index }) => {
                        self.emit(SessionEvent::SegmentAppended { index });
                    }
                    Some(StreamEvent::Ready) => self.set_state(SessionState::Playing),
                    Some(StreamEvent::Ended { segments }) => {
                        self.emit(SessionEvent::StreamEnded { segments });
                        self.set_state(SessionState::Playing);
                        stream_open = false;
                    }
                    Some(StreamEvent::Failed(e)) => return Err(e.into()),
                    None => {
                        return Err(TransportError::Player {
                            message: "live stream stopped without reporting why".to_string(),
                        }
                        .into());
                    }
                },
                event = self.surface.next_event(), if surface_open => match event {
                    Some(VideoEvent::Error(message)) => {
                        return Err(TransportError::Player { message }.into());
                    }
                    Some(other) => debug!("Video event: {:?}", other),
                    None => surface_open = false,
                },
                command = self.commands.recv(), if commands_open => match command {
                    Some(command) => debug!("Ignoring {:?} on the live socket transport", command),
                    None => commands_open = false,
                },
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = previous.as_str(), to = state.as_str(), "Session state changed");
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending().await,
    }
}

/// Owner side of a `PlaybackSession`. Dropping it tears the session down.
pub struct SessionHandle {
    camera_id: CameraId,
    session_id: Uuid,
    state: watch::Receiver<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Option<PlayerError>>>,
    outcome: Option<PlayerError>,
}

impl SessionHandle {
    pub fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Asks a stalled playlist session to fetch its continuation again
    pub fn retry(&self) -> bool {
        self.commands.send(SessionCommand::RetryContinuation).is_ok()
    }

    /// Resolves once the session reaches `state` or a terminal state
    pub async fn wait_for(&self, state: SessionState) -> SessionState {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(|s| *s == state || s.is_terminal()).await;
        match reached {
            Ok(current) => *current,
            Err(_) => SessionState::Closed,
        }
    }

    /// Resolves with `Error` or `Closed`
    pub async fn wait_terminal(&self) -> SessionState {
        self.wait_for(SessionState::Closed).await
    }

    /// Tears the session down and waits until its resources are released.
    /// Returns the error that stopped it, if any. Later calls return the same.
    pub async fn close(&mut self) -> Option<PlayerError> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            self.outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => Some(PlayerError::Transport(TransportError::Player {
                    message: format!("session task failed: {}", e),
                })),
            };
        }
        self.outcome.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
