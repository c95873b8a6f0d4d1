use chrono::NaiveDate;
use common::CameraId;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use crate::errors::{BackendError, Result};
use crate::registry::CameraRegistry;
use crate::storage::{playlist_ref, StorageLayout, PLAYLIST_NAME};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// 播放列表扫描器
///
/// 每个摄像头取最新一天的 `output.m3u8` 作为当前播放列表。
pub struct PlaylistScanner {
    layout: StorageLayout,
    registry: CameraRegistry,
}

impl PlaylistScanner {
    pub fn new(layout: StorageLayout, registry: CameraRegistry) -> Self {
        Self { layout, registry }
    }

    /// 扫描一次，返回发生变化的摄像头数量
    pub async fn scan_once(&self) -> Result<usize> {
        let cameras_dir = self.layout.cameras_dir();
        if !cameras_dir.exists() {
            debug!("Storage has no cameras directory: {:?}", cameras_dir);
            return Ok(0);
        }

        let mut changed = 0;
        let mut entries = tokio::fs::read_dir(&cameras_dir)
            .await
            .map_err(|e| BackendError::storage(&cameras_dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackendError::storage(&cameras_dir, e))?
        {
            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<CameraId>().ok())
            else {
                continue;
            };

            let latest = self.latest_playlist_date(id).await?;
            self.registry.ensure(id);
            let playlist = latest.map(|date| playlist_ref(id, &date.format(DATE_FORMAT).to_string()));
            if self.registry.set_active_playlist(id, playlist)? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn latest_playlist_date(&self, id: CameraId) -> Result<Option<NaiveDate>> {
        let segments_dir = self.layout.segments_dir(id);
        if !segments_dir.exists() {
            return Ok(None);
        }

        let mut latest = None;
        let mut entries = tokio::fs::read_dir(&segments_dir)
            .await
            .map_err(|e| BackendError::storage(&segments_dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackendError::storage(&segments_dir, e))?
        {
            let name = entry.file_name();
            let Some(date) = name
                .to_str()
                .and_then(|name| NaiveDate::parse_from_str(name, DATE_FORMAT).ok())
            else {
                continue;
            };
            if !has_playlist(&entry.path()) {
                continue;
            }
            if latest.map_or(true, |current| date > current) {
                latest = Some(date);
            }
        }
        Ok(latest)
    }

    /// 周期扫描直到取消
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.scan_once().await {
                        Ok(0) => {}
                        Ok(changed) => debug!("Playlist scan updated {} cameras", changed),
                        Err(e) => warn!("Playlist scan failed: {}", e),
                    }
                }
            }
        }
        debug!("Playlist scanner stopped");
    }
}

fn has_playlist(day_dir: &Path) -> bool {
    day_dir.join(PLAYLIST_NAME).is_file()
}
