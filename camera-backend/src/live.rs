use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use common::{CameraId, ClientCommand, END_OF_STREAM};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;
use crate::errors::{BackendError, Result};
use crate::registry::CameraRegistry;
use crate::storage::StorageLayout;

/// 按文件名顺序读取直播分片目录
///
/// 每次请求都会重新列出目录，新写入的分片会被后续请求看到。
/// 以 `.` 开头的文件视为尚未写完，不会发送。
pub struct LiveFeed {
    dir: PathBuf,
    sent: usize,
}

impl LiveFeed {
    pub fn new(layout: &StorageLayout, id: CameraId) -> Self {
        Self {
            dir: layout.live_dir(id),
            sent: 0,
        }
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    /// 下一个分片；没有更多分片时返回 None
    pub async fn next_segment(&mut self) -> Result<Option<Bytes>> {
        let files = self.list_files().await?;
        let Some(path) = files.into_iter().nth(self.sent) else {
            return Ok(None);
        };
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| BackendError::storage(&path, e))?;
        self.sent += 1;
        Ok(Some(Bytes::from(data)))
    }

    async fn list_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| BackendError::storage(&self.dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackendError::storage(&self.dir, e))?
        {
            let path = entry.path();
            let visible = path
                .file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| !name.starts_with('.'));
            if visible && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// 直播连接参数
#[derive(Debug, Clone, Copy)]
pub struct LiveOptions {
    /// 分片追上后检查新分片的间隔
    pub poll_interval: Duration,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// What the connection sends for one "next"
enum Reply {
    Segment(Bytes),
    EndOfStream,
    /// Client went away or storage failed
    Disconnect,
}

/// 一个直播连接：每收到一次 "next" 发送一个分片。
///
/// 已有分片发完后等待新分片写入；摄像头被移除或停止录制后发送 "end"。
pub async fn serve_live_socket(
    mut socket: WebSocket,
    camera_id: CameraId,
    mut feed: LiveFeed,
    registry: CameraRegistry,
    options: LiveOptions,
) {
    let connection_id = Uuid::new_v4();
    info!("Live socket {} opened for camera {}", connection_id, camera_id);
    let mut ticker = tokio::time::interval(options.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while let Some(message) = socket.recv().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("Live socket {} receive error: {}", connection_id, e);
                break;
            }
        };

        match ClientCommand::parse(&text) {
            Ok(ClientCommand::NextSegment) => {}
            Err(e) => {
                debug!("Live socket {} ignoring message: {}", connection_id, e);
                continue;
            }
        }

        let reply = match next_reply(&mut socket, camera_id, &mut feed, &registry, &mut ticker).await {
            Reply::Segment(segment) => Message::Binary(segment.to_vec()),
            Reply::EndOfStream => Message::Text(END_OF_STREAM.to_string()),
            Reply::Disconnect => break,
        };
        let finished = matches!(reply, Message::Text(_));
        if socket.send(reply).await.is_err() {
            break;
        }
        if finished {
            debug!("Live socket {} sent end after {} segments", connection_id, feed.sent());
            break;
        }
    }

    let _ = socket.close().await;
    info!("Live socket {} closed ({} segments)", connection_id, feed.sent());
}

/// Waits for the next fragment while the camera keeps recording
async fn next_reply(
    socket: &mut WebSocket,
    camera_id: CameraId,
    feed: &mut LiveFeed,
    registry: &CameraRegistry,
    ticker: &mut Interval,
) -> Reply {
    ticker.reset();
    loop {
        match feed.next_segment().await {
            Ok(Some(segment)) => return Reply::Segment(segment),
            Ok(None) if !registry.is_recording(camera_id) => return Reply::EndOfStream,
            Ok(None) => {}
            Err(e) => {
                warn!("Live socket for camera {} storage error: {}", camera_id, e);
                return Reply::Disconnect;
            }
        }

        tokio::select! {
            _ = ticker.tick() => {}
            message = socket.recv() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return Reply::Disconnect,
                Some(Ok(other)) => trace!("Ignoring {:?} while waiting for a fragment", other),
            },
        }
    }
}
