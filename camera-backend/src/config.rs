use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub storage_root: PathBuf,
    /// 播放列表滚动检查间隔
    pub scan_interval: Duration,
    /// 直播分片追上后检查新分片的间隔
    pub live_poll_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            storage_root: PathBuf::from("./storage"),
            scan_interval: Duration::from_secs(2),
            live_poll_interval: Duration::from_millis(250),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
