use serde::{Deserialize, Serialize};

/// 摄像头ID
pub type CameraId = u64;

/// 摄像头直播配置
///
/// 由后端生成，客户端只读。`active_playlist` 为空表示直播尚不可播放。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraStreamConfig {
    pub id: CameraId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub active_playlist: Option<String>,
    #[serde(default, alias = "force_transcode", skip_serializing_if = "Option::is_none")]
    pub transcode: Option<bool>,
}

impl CameraStreamConfig {
    pub fn new(id: CameraId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            location: None,
            active_playlist: None,
            transcode: None,
        }
    }

    pub fn with_playlist(mut self, playlist: impl Into<String>) -> Self {
        self.active_playlist = Some(playlist.into());
        self
    }

    /// 当前可播放的播放列表（空字符串视为不可用）
    pub fn playlist(&self) -> Option<&str> {
        self.active_playlist
            .as_deref()
            .filter(|playlist| !playlist.trim().is_empty())
    }

    pub fn is_publishable(&self) -> bool {
        self.playlist().is_some()
    }
}

/// 添加摄像头请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraCreate {
    pub name: String,
    /// 摄像头的 RTSP 地址
    pub url: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub force_transcode: Option<bool>,
}
