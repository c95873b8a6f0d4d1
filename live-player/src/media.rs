use async_trait::async_trait;
use bytes::Bytes;
use url::Url;
use crate::errors::MediaError;

/// Completion events of a media buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferEvent {
    /// The last `begin_append` finished
    UpdateEnd,
    Error(String),
}

/// Streaming media buffer that accepts one append at a time
#[async_trait]
pub trait MediaBuffer: Send {
    /// Starts appending `chunk`; completion arrives through `next_event`.
    /// Fails when an append is already running or the buffer was ended.
    fn begin_append(&mut self, chunk: Bytes) -> Result<(), MediaError>;

    fn is_updating(&self) -> bool;

    /// Next completion event, `None` once the buffer is gone
    async fn next_event(&mut self) -> Option<BufferEvent>;

    /// Marks the buffered stream as finished
    fn end_of_stream(&mut self) -> Result<(), MediaError>;
}

/// Player events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoEvent {
    Playing,
    /// The current source played to its end
    Ended,
    Error(String),
}

/// The element a camera tile renders into
#[async_trait]
pub trait VideoSurface: Send {
    /// Points the player at a playlist URL and starts playback
    async fn load_playlist(&mut self, url: &Url) -> Result<(), MediaError>;

    async fn next_event(&mut self) -> Option<VideoEvent>;

    /// Attaches a fresh media source and returns its buffer for `mime_codec`
    async fn open_media_source(&mut self, mime_codec: &str) -> Result<Box<dyn MediaBuffer>, MediaError>;

    /// Detaches the source and revokes any playback URL created for it
    async fn release(&mut self);
}

/// `video/mp4; codecs="..."` -> `video/mp4`
pub fn container_of(mime_codec: &str) -> &str {
    mime_codec
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
}
