use std::path::{Path, PathBuf};
use common::CameraId;
use crate::errors::{BackendError, Result};

/// HLS 播放列表文件名
pub const PLAYLIST_NAME: &str = "output.m3u8";

/// 存储目录布局
///
/// ```text
/// <root>/cameras/<id>/segments/<YYYY-MM-DD>/output.m3u8
/// <root>/cameras/<id>/segments/<YYYY-MM-DD>/output0.ts ...
/// <root>/cameras/<id>/live/000.m4s ...
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cameras_dir(&self) -> PathBuf {
        self.root.join("cameras")
    }

    pub fn camera_dir(&self, id: CameraId) -> PathBuf {
        self.cameras_dir().join(id.to_string())
    }

    pub fn segments_dir(&self, id: CameraId) -> PathBuf {
        self.camera_dir(id).join("segments")
    }

    /// 直播分片目录
    pub fn live_dir(&self, id: CameraId) -> PathBuf {
        self.camera_dir(id).join("live")
    }

    /// 某一天的文件；拒绝任何可能跳出目录的路径片段
    pub fn dated_file(&self, id: CameraId, date: &str, file: &str) -> Result<PathBuf> {
        Ok(self
            .segments_dir(id)
            .join(checked_component(date)?)
            .join(checked_component(file)?))
    }
}

/// `active_playlist` value of a day's playlist
pub fn playlist_ref(id: CameraId, date: &str) -> String {
    format!("cameras/{}/segments/{}/{}", id, date, PLAYLIST_NAME)
}

fn checked_component(component: &str) -> Result<&str> {
    let valid = !component.is_empty()
        && component != "."
        && component != ".."
        && !component.contains(['/', '\\']);
    if valid {
        Ok(component)
    } else {
        Err(BackendError::InvalidPath {
            component: component.to_string(),
        })
    }
}

/// MIME type served for a stored file
pub fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("ts") => "video/mp2t",
        Some("mp4") | Some("m4s") => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let layout = StorageLayout::new("/data");
        assert_eq!(layout.live_dir(3), PathBuf::from("/data/cameras/3/live"));
        assert_eq!(
            layout.dated_file(3, "2024-05-01", "output.m3u8").unwrap(),
            PathBuf::from("/data/cameras/3/segments/2024-05-01/output.m3u8")
        );
        assert_eq!(playlist_ref(3, "2024-05-01"), "cameras/3/segments/2024-05-01/output.m3u8");
    }

    #[test]
    fn test_traversal_is_rejected() {
        let layout = StorageLayout::new("/data");
        assert!(layout.dated_file(3, "..", "passwd").is_err());
        assert!(layout.dated_file(3, "2024-05-01", "a/b.ts").is_err());
        assert!(layout.dated_file(3, "2024-05-01", "").is_err());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type(Path::new("output.m3u8")), "application/vnd.apple.mpegurl");
        assert_eq!(content_type(Path::new("output3.ts")), "video/mp2t");
        assert_eq!(content_type(Path::new("README")), "application/octet-stream");
    }
}
