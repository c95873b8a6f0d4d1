use std::path::{Path, PathBuf};
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use common::CameraId;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;
use crate::errors::MediaError;
use crate::media::{container_of, BufferEvent, MediaBuffer, VideoEvent, VideoSurface};

/// Containers the headless media source accepts
const SUPPORTED_CONTAINERS: [&str; 2] = ["video/mp4", "audio/mp4"];

/// Video element stand-in for terminals.
///
/// Playlists are fetched and "played" for the sum of their segment durations,
/// then reported as ended. Media-source output is written in append order to
/// `<output>/camera-<id>.mp4`.
pub struct HeadlessSurface {
    camera_id: CameraId,
    client: reqwest::Client,
    output_dir: PathBuf,
    events_tx: mpsc::UnboundedSender<VideoEvent>,
    events_rx: mpsc::UnboundedReceiver<VideoEvent>,
    playback: Option<JoinHandle<()>>,
    recording: Option<PathBuf>,
}

impl HeadlessSurface {
    pub fn new(camera_id: CameraId, client: reqwest::Client, output_dir: impl Into<PathBuf>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            camera_id,
            client,
            output_dir: output_dir.into(),
            events_tx,
            events_rx,
            playback: None,
            recording: None,
        }
    }

    pub fn recording_path(&self) -> PathBuf {
        self.output_dir.join(format!("camera-{}.mp4", self.camera_id))
    }

    async fn fetch_playlist(&self, url: &Url) -> Result<String, MediaError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| MediaError::Playlist {
                message: format!("GET {} failed: {}", url, e),
            })?;

        if !response.status().is_success() {
            return Err(MediaError::Playlist {
                message: format!("GET {} answered {}", url, response.status()),
            });
        }

        response.text().await.map_err(|e| MediaError::Playlist {
            message: e.to_string(),
        })
    }

    fn stop_playback(&mut self) {
        if let Some(playback) = self.playback.take() {
            playback.abort();
        }
    }
}

/// Total play time of an HLS media playlist
pub fn playlist_duration(content: &str) -> Result<Duration, MediaError> {
    let playlist = hls_m3u8::MediaPlaylist::try_from(content).map_err(|e| MediaError::Playlist {
        message: e.to_string(),
    })?;

    Ok(playlist
        .segments
        .values()
        .map(|segment| segment.duration.duration())
        .sum())
}

#[async_trait]
impl VideoSurface for HeadlessSurface {
    async fn load_playlist(&mut self, url: &Url) -> Result<(), MediaError> {
        self.stop_playback();

        let content = self.fetch_playlist(url).await?;
        let duration = playlist_duration(&content)?;
        info!(camera_id = self.camera_id, %url, ?duration, "Playing playlist");

        let events = self.events_tx.clone();
        self.playback = Some(tokio::spawn(async move {
            let _ = events.send(VideoEvent::Playing);
            tokio::time::sleep(duration).await;
            let _ = events.send(VideoEvent::Ended);
        }));
        Ok(())
    }

    async fn next_event(&mut self) -> Option<VideoEvent> {
        self.events_rx.recv().await
    }

    async fn open_media_source(&mut self, mime_codec: &str) -> Result<Box<dyn MediaBuffer>, MediaError> {
        if !SUPPORTED_CONTAINERS.contains(&container_of(mime_codec)) {
            return Err(MediaError::UnsupportedMimeType {
                mime: mime_codec.to_string(),
            });
        }
        if self.recording.is_some() {
            return Err(MediaError::MediaSource {
                message: "a media source is already attached".to_string(),
            });
        }

        let path = self.recording_path();
        let buffer = FileMediaBuffer::create(&path).await?;
        info!(camera_id = self.camera_id, path = %path.display(), "Recording live stream");
        self.recording = Some(path);
        Ok(Box::new(buffer))
    }

    async fn release(&mut self) {
        self.stop_playback();
        if let Some(path) = self.recording.take() {
            debug!(camera_id = self.camera_id, path = %path.display(), "Media source detached");
        }
    }
}

/// Media buffer that appends chunks to a file on a writer task
pub struct FileMediaBuffer {
    chunks: Option<mpsc::UnboundedSender<Bytes>>,
    events: mpsc::UnboundedReceiver<BufferEvent>,
    updating: bool,
}

impl FileMediaBuffer {
    pub async fn create(path: &Path) -> Result<Self, MediaError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| MediaError::MediaSource {
                message: format!("Failed to create {}: {}", parent.display(), e),
            })?;
        }
        let file = File::create(path).await.map_err(|e| MediaError::MediaSource {
            message: format!("Failed to create {}: {}", path.display(), e),
        })?;
        Ok(Self::spawn(file))
    }

    fn spawn(mut file: File) -> Self {
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<Bytes>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                let event = match file.write_all(&chunk).await {
                    Ok(()) => BufferEvent::UpdateEnd,
                    Err(e) => BufferEvent::Error(e.to_string()),
                };
                if event_tx.send(event).is_err() {
                    break;
                }
            }
            if let Err(e) = file.flush().await {
                warn!("Failed to flush recording: {}", e);
            }
        });

        Self {
            chunks: Some(chunk_tx),
            events: event_rx,
            updating: false,
        }
    }
}

#[async_trait]
impl MediaBuffer for FileMediaBuffer {
    fn begin_append(&mut self, chunk: Bytes) -> Result<(), MediaError> {
        if self.updating {
            return Err(MediaError::InvalidState {
                reason: "an append is already running".to_string(),
            });
        }
        let chunks = self.chunks.as_ref().ok_or_else(|| MediaError::InvalidState {
            reason: "buffered stream already ended".to_string(),
        })?;
        chunks.send(chunk).map_err(|_| MediaError::SourceBuffer {
            message: "recording writer stopped".to_string(),
        })?;
        self.updating = true;
        Ok(())
    }

    fn is_updating(&self) -> bool {
        self.updating
    }

    async fn next_event(&mut self) -> Option<BufferEvent> {
        let event = self.events.recv().await?;
        self.updating = false;
        Some(event)
    }

    fn end_of_stream(&mut self) -> Result<(), MediaError> {
        self.chunks.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYLIST: &str = "#EXTM3U\n\
        #EXT-X-VERSION:3\n\
        #EXT-X-TARGETDURATION:4\n\
        #EXT-X-MEDIA-SEQUENCE:0\n\
        #EXTINF:4.0,\n\
        output0.ts\n\
        #EXTINF:4.0,\n\
        output1.ts\n\
        #EXTINF:2.5,\n\
        output2.ts\n\
        #EXT-X-ENDLIST\n";

    #[test]
    fn test_playlist_duration_sums_segments() {
        assert_eq!(playlist_duration(PLAYLIST).unwrap(), Duration::from_millis(10_500));
    }

    #[test]
    fn test_invalid_playlist_is_rejected() {
        assert!(matches!(
            playlist_duration("not a playlist"),
            Err(MediaError::Playlist { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_codec_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = HeadlessSurface::new(3, reqwest::Client::new(), dir.path());

        let err = surface
            .open_media_source(r#"video/webm; codecs="vp9""#)
            .await
            .err()
            .unwrap();
        assert_eq!(
            err,
            MediaError::UnsupportedMimeType {
                mime: r#"video/webm; codecs="vp9""#.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_recording_keeps_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut surface = HeadlessSurface::new(3, reqwest::Client::new(), dir.path());
        let mut buffer = surface
            .open_media_source(r#"video/mp4; codecs="avc1.640033""#)
            .await
            .unwrap();

        for chunk in [&b"ftyp"[..], b"moof", b"mdat"] {
            buffer.begin_append(Bytes::copy_from_slice(chunk)).unwrap();
            assert!(buffer.is_updating());
            assert!(buffer.begin_append(Bytes::from_static(b"x")).is_err());
            assert_eq!(buffer.next_event().await, Some(BufferEvent::UpdateEnd));
        }
        buffer.end_of_stream().unwrap();
        assert_eq!(buffer.next_event().await, None);

        let written = tokio::fs::read(surface.recording_path()).await.unwrap();
        assert_eq!(written, b"ftypmoofmdat");

        assert!(surface.open_media_source("video/mp4").await.is_err());
        surface.release().await;
    }
}
