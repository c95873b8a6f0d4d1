use chrono::{DateTime, Utc};
use common::{CameraCreate, CameraId, CameraStreamConfig};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;
use crate::errors::{BackendError, Result};

/// 摄像头记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraRecord {
    #[serde(flatten)]
    pub config: CameraStreamConfig,
    #[serde(default)]
    pub url: String,
    pub is_recording: bool,
    pub created_at: DateTime<Utc>,
}

/// 摄像头注册表
#[derive(Clone)]
pub struct CameraRegistry {
    cameras: Arc<DashMap<CameraId, CameraRecord>>,
    next_id: Arc<AtomicU64>,
}

impl Default for CameraRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self {
            cameras: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// 添加摄像头
    pub fn add(&self, create: CameraCreate) -> Result<CameraRecord> {
        let name = create.name.trim();
        if name.is_empty() {
            return Err(BackendError::InvalidCamera {
                reason: "name is empty".to_string(),
            });
        }
        if create.url.trim().is_empty() {
            return Err(BackendError::InvalidCamera {
                reason: "url is empty".to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut config = CameraStreamConfig::new(id, name);
        config.location = create.location;
        config.transcode = create.force_transcode;

        let record = CameraRecord {
            config,
            url: create.url,
            is_recording: true,
            created_at: Utc::now(),
        };
        info!("Registering camera {}: {}", id, record.config.name);
        self.cameras.insert(id, record.clone());
        Ok(record)
    }

    /// 注册在存储目录中发现的摄像头
    pub fn ensure(&self, id: CameraId) -> bool {
        if self.cameras.contains_key(&id) {
            return false;
        }
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
        self.cameras.entry(id).or_insert_with(|| {
            info!("Discovered camera {} in storage", id);
            CameraRecord {
                config: CameraStreamConfig::new(id, format!("Camera {}", id)),
                url: String::new(),
                is_recording: true,
                created_at: Utc::now(),
            }
        });
        true
    }

    pub fn get(&self, id: CameraId) -> Result<CameraRecord> {
        self.cameras
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(BackendError::CameraNotFound { id })
    }

    /// 按ID排序的所有摄像头
    pub fn list(&self) -> Vec<CameraRecord> {
        let mut cameras: Vec<CameraRecord> = self
            .cameras
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        cameras.sort_by_key(|camera| camera.config.id);
        cameras
    }

    /// 更新当前播放列表，返回是否发生变化
    pub fn set_active_playlist(&self, id: CameraId, playlist: Option<String>) -> Result<bool> {
        let mut entry = self
            .cameras
            .get_mut(&id)
            .ok_or(BackendError::CameraNotFound { id })?;
        if entry.config.active_playlist == playlist {
            return Ok(false);
        }
        info!("Camera {} active playlist: {:?}", id, playlist);
        entry.config.active_playlist = playlist;
        Ok(true)
    }

    /// 开始或停止录制，返回是否发生变化
    pub fn set_recording(&self, id: CameraId, recording: bool) -> Result<bool> {
        let mut entry = self
            .cameras
            .get_mut(&id)
            .ok_or(BackendError::CameraNotFound { id })?;
        if entry.is_recording == recording {
            return Ok(false);
        }
        info!("Camera {} recording: {}", id, recording);
        entry.is_recording = recording;
        Ok(true)
    }

    /// 摄像头存在且仍在录制
    pub fn is_recording(&self, id: CameraId) -> bool {
        self.cameras
            .get(&id)
            .map_or(false, |entry| entry.is_recording)
    }
}
