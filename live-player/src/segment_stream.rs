use std::sync::Arc;
use common::CameraId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use crate::buffer_sink::BufferSink;
use crate::errors::{MediaError, TransportError};
use crate::media::BufferEvent;
use crate::socket::{SegmentSocket, SocketConnector, SocketMessage};

/// Events reported by a running stream client
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Connected,
    /// A chunk reached the sink while the buffer is busy
    Buffering { queued: usize },
    /// Append number `index` (1-based) completed
    Appended { index: u64 },
    /// Everything received so far is appended
    Ready,
    Ended { segments: u64 },
    Failed(TransportError),
}

#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// Stop after this many appended segments
    pub max_segments: Option<u64>,
}

/// Outstanding `"next"` requests, bounded to one
#[derive(Debug, Default)]
pub struct CreditWindow {
    outstanding: bool,
}

impl CreditWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the credit; `false` when one is already outstanding
    pub fn acquire(&mut self) -> bool {
        if self.outstanding {
            return false;
        }
        self.outstanding = true;
        true
    }

    /// Returns the credit once its segment is fully appended
    pub fn release(&mut self) {
        self.outstanding = false;
    }

    pub fn is_outstanding(&self) -> bool {
        self.outstanding
    }
}

enum PumpExit {
    Finished,
    Cancelled,
}

/// Pulls segments from `/cameras/{id}/live` one at a time into a `BufferSink`
pub struct SegmentStreamClient {
    camera_id: CameraId,
    url: Url,
    connector: Arc<dyn SocketConnector>,
    options: StreamOptions,
}

impl SegmentStreamClient {
    pub fn new(
        camera_id: CameraId,
        url: Url,
        connector: Arc<dyn SocketConnector>,
        options: StreamOptions,
    ) -> Self {
        Self {
            camera_id,
            url,
            connector,
            options,
        }
    }

    /// Spawns the client. It stops when `cancel` fires, on end of stream,
    /// or on the first transport failure.
    pub fn start(self, sink: BufferSink, cancel: CancellationToken) -> StreamHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            self.run(sink, events_tx, task_cancel).await;
        });

        StreamHandle {
            events: events_rx,
            cancel,
            task: Some(task),
        }
    }

    async fn run(
        self,
        mut sink: BufferSink,
        events: mpsc::UnboundedSender<StreamEvent>,
        cancel: CancellationToken,
    ) {
        let camera_id = self.camera_id;

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.connector.connect(&self.url) => Some(result),
        };

        let mut socket = match connected {
            None => {
                end_sink(&mut sink, camera_id);
                return;
            }
            Some(Err(e)) => {
                warn!(camera_id, "Live socket connect failed: {}", e);
                end_sink(&mut sink, camera_id);
                let _ = events.send(StreamEvent::Failed(e));
                return;
            }
            Some(Ok(socket)) => socket,
        };

        info!(camera_id, url = %self.url, "Live socket open");
        let _ = events.send(StreamEvent::Connected);

        let outcome = self.pump(socket.as_mut(), &mut sink, &events, &cancel).await;

        if let Err(e) = socket.close().await {
            debug!(camera_id, "Live socket close: {}", e);
        }

        match outcome {
            Ok(PumpExit::Finished) => {
                let segments = sink.appended();
                match sink.end() {
                    Ok(()) => {
                        info!(camera_id, segments, "Live stream ended");
                        let _ = events.send(StreamEvent::Ended { segments });
                    }
                    Err(e) => {
                        let _ = events.send(StreamEvent::Failed(e.into()));
                    }
                }
            }
            Ok(PumpExit::Cancelled) => {
                debug!(camera_id, appended = sink.appended(), "Live stream cancelled");
                end_sink(&mut sink, camera_id);
            }
            Err(e) => {
                warn!(camera_id, appended = sink.appended(), "Live stream failed: {}", e);
                end_sink(&mut sink, camera_id);
                let _ = events.send(StreamEvent::Failed(e));
            }
        }
    }

    async fn pump(
        &self,
        socket: &mut dyn SegmentSocket,
        sink: &mut BufferSink,
        events: &mpsc::UnboundedSender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<PumpExit, TransportError> {
        let mut credit = CreditWindow::new();
        let mut end_of_stream = false;

        credit.acquire();
        socket.request_next().await?;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(PumpExit::Cancelled),
                event = sink.next_event() => match event {
                    Some(BufferEvent::UpdateEnd) => {
                        sink.on_update_end()?;
                        let appended = sink.appended();
                        let _ = events.send(StreamEvent::Appended { index: appended });

                        if self.limit_reached(appended) {
                            debug!(camera_id = self.camera_id, appended, "Segment limit reached");
                            return Ok(PumpExit::Finished);
                        }
                        if !sink.is_ready() {
                            continue;
                        }
                        credit.release();
                        if end_of_stream {
                            return Ok(PumpExit::Finished);
                        }
                        let _ = events.send(StreamEvent::Ready);
                        if credit.acquire() {
                            socket.request_next().await?;
                        }
                    }
                    Some(BufferEvent::Error(message)) => {
                        return Err(MediaError::SourceBuffer { message }.into());
                    }
                    None => {
                        return Err(MediaError::MediaSource {
                            message: "media buffer was detached".to_string(),
                        }
                        .into());
                    }
                },
                message = socket.recv(), if !end_of_stream => match message {
                    Some(Ok(SocketMessage::Segment(data))) => {
                        sink.push(data)?;
                        let _ = events.send(StreamEvent::Buffering { queued: sink.queued() });
                    }
                    Some(Ok(SocketMessage::EndOfStream)) => {
                        debug!(camera_id = self.camera_id, "Server signalled end of stream");
                        end_of_stream = true;
                        credit.release();
                        if sink.is_ready() {
                            return Ok(PumpExit::Finished);
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(TransportError::ConnectionClosed {
                            code: None,
                            reason: "socket closed by peer".to_string(),
                        });
                    }
                },
            }
        }
    }

    fn limit_reached(&self, appended: u64) -> bool {
        matches!(self.options.max_segments, Some(max) if appended >= max)
    }
}

fn end_sink(sink: &mut BufferSink, camera_id: CameraId) {
    if let Err(e) = sink.end() {
        debug!(camera_id, "Ending media buffer: {}", e);
    }
}

/// Owner side of a running `SegmentStreamClient`
pub struct StreamHandle {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Next event; `None` once the client stopped and its events were drained
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Stops the client and waits until its socket is closed. Safe to call
    /// any number of times.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Stream task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
