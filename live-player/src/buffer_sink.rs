use std::collections::VecDeque;
use bytes::Bytes;
use tracing::{debug, trace};
use crate::errors::MediaError;
use crate::media::{BufferEvent, MediaBuffer};

/// Where a chunk or completion left the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    /// A chunk is being appended
    Appending,
    /// The buffer is busy; `depth` chunks wait behind it
    Queued { depth: usize },
    /// Nothing in flight and nothing queued
    Ready,
}

/// Single-writer front of a `MediaBuffer`.
///
/// Chunks are appended strictly in the order they were pushed. A chunk pushed
/// while the buffer is updating waits in a FIFO queue and is started by the
/// completion of the one before it.
pub struct BufferSink {
    buffer: Box<dyn MediaBuffer>,
    queue: VecDeque<Bytes>,
    in_flight: bool,
    appended: u64,
    ended: bool,
}

impl BufferSink {
    pub fn new(buffer: Box<dyn MediaBuffer>) -> Self {
        Self {
            buffer,
            queue: VecDeque::new(),
            in_flight: false,
            appended: 0,
            ended: false,
        }
    }

    pub fn push(&mut self, chunk: Bytes) -> Result<SinkStatus, MediaError> {
        if self.ended {
            return Err(MediaError::InvalidState {
                reason: "buffered stream already ended".to_string(),
            });
        }

        if self.in_flight || self.buffer.is_updating() || !self.queue.is_empty() {
            self.queue.push_back(chunk);
            trace!(depth = self.queue.len(), "Buffer busy, chunk queued");
            return Ok(SinkStatus::Queued {
                depth: self.queue.len(),
            });
        }

        self.start(chunk)?;
        Ok(SinkStatus::Appending)
    }

    /// Handles the buffer's `UpdateEnd`
    pub fn on_update_end(&mut self) -> Result<SinkStatus, MediaError> {
        if !self.in_flight {
            debug!("Ignoring update end with no append in flight");
            return Ok(self.status());
        }

        self.in_flight = false;
        self.appended += 1;

        match self.queue.pop_front() {
            Some(next) if !self.ended => {
                self.start(next)?;
                Ok(SinkStatus::Appending)
            }
            _ => Ok(SinkStatus::Ready),
        }
    }

    pub fn status(&self) -> SinkStatus {
        if self.in_flight {
            if self.queue.is_empty() {
                SinkStatus::Appending
            } else {
                SinkStatus::Queued {
                    depth: self.queue.len(),
                }
            }
        } else {
            SinkStatus::Ready
        }
    }

    /// True when the sink can take another chunk without queueing
    pub fn is_ready(&self) -> bool {
        !self.ended && self.status() == SinkStatus::Ready
    }

    /// Chunks whose append completed
    pub fn appended(&self) -> u64 {
        self.appended
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub async fn next_event(&mut self) -> Option<BufferEvent> {
        self.buffer.next_event().await
    }

    /// Drops queued chunks and ends the buffered stream. Only the first call
    /// reaches the buffer.
    pub fn end(&mut self) -> Result<(), MediaError> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        self.queue.clear();
        self.buffer.end_of_stream()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    fn start(&mut self, chunk: Bytes) -> Result<(), MediaError> {
        self.buffer.begin_append(chunk)?;
        self.in_flight = true;
        Ok(())
    }
}
