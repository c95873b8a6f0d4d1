use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use url::Url;
use crate::errors::PlayerError;

/// Player configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Backend endpoints
    pub backend: BackendConfig,

    /// Readiness polling
    pub readiness: ReadinessConfig,

    /// Playlist continuation
    pub continuation: ContinuationConfig,

    /// Live transport selection
    pub stream: StreamConfig,

    /// Where headless tiles write what they play
    pub output: OutputConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the camera backend, e.g. `http://localhost:8000/`
    pub base_url: String,

    /// Per-request timeout
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Readiness requests made before giving up (0 behaves like 1)
    pub max_retries: u32,

    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub retry_delay: Duration,

    /// 1.0 keeps the delay fixed
    pub backoff_multiplier: f64,

    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub max_delay: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuationConfig {
    /// Automatic retries of a failed continuation fetch before the tile stays stalled
    pub max_retries: u32,

    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub retry_delay: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub transport: TransportKind,

    /// MIME type and codecs handed to the media source
    pub mime_codec: String,

    /// Stop requesting after this many segments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_segments: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    pub level: String,

    pub with_target: bool,
}

/// Live transport used by every session of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// HTTP playlist with continuation on end of playlist
    Playlist,
    /// Raw segments pulled over the live socket
    Socket,
}

impl FromStr for TransportKind {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "playlist" | "hls" => Ok(TransportKind::Playlist),
            "socket" | "ws" | "websocket" => Ok(TransportKind::Socket),
            other => Err(PlayerError::Configuration {
                message: format!("Unknown transport: {}", other),
            }),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            readiness: ReadinessConfig::default(),
            continuation: ContinuationConfig::default(),
            stream: StreamConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_delay: Duration::from_secs(2),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl Default for ContinuationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Playlist,
            mime_codec: r#"video/mp4; codecs="avc1.640033,mp4a.40.5""#.to_string(),
            max_segments: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./recordings"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: false,
        }
    }
}

impl BackendConfig {
    /// Parsed base URL, always ending in `/` so relative joins keep any path prefix
    pub fn base_url(&self) -> Result<Url, PlayerError> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw).map_err(|e| PlayerError::Configuration {
            message: format!("Invalid backend URL '{}': {}", self.base_url, e),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(PlayerError::Configuration {
                message: format!("Backend URL must be http or https, got {}", scheme),
            }),
        }
    }
}

/// Configuration manager for loading, saving, and validating configurations
pub struct ConfigManager {
    config_path: PathBuf,
    config: PlayerConfig,
}

impl ConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            config: PlayerConfig::default(),
        }
    }

    /// Load configuration from file, writing the defaults when it does not exist yet
    pub async fn load(&mut self) -> Result<(), PlayerError> {
        if !self.config_path.exists() {
            self.save().await?;
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.config_path).await
            .map_err(|e| PlayerError::Configuration {
                message: format!("Failed to read config file: {}", e),
            })?;

        self.config = toml::from_str(&content)
            .map_err(|e| PlayerError::Configuration {
                message: format!("Failed to parse config file: {}", e),
            })?;

        self.validate()?;
        Ok(())
    }

    pub async fn save(&self) -> Result<(), PlayerError> {
        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| PlayerError::Configuration {
                message: format!("Failed to serialize config: {}", e),
            })?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await
                    .map_err(|e| PlayerError::Configuration {
                        message: format!("Failed to create config directory: {}", e),
                    })?;
            }
        }

        tokio::fs::write(&self.config_path, content).await
            .map_err(|e| PlayerError::Configuration {
                message: format!("Failed to write config file: {}", e),
            })?;

        Ok(())
    }

    pub fn get_config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn get_config_mut(&mut self) -> &mut PlayerConfig {
        &mut self.config
    }

    pub fn into_config(self) -> PlayerConfig {
        self.config
    }

    pub fn validate(&self) -> Result<(), PlayerError> {
        validate(&self.config)
    }
}

/// Validate configuration
pub fn validate(config: &PlayerConfig) -> Result<(), PlayerError> {
    config.backend.base_url()?;

    if config.backend.request_timeout.is_zero() {
        return Err(PlayerError::Configuration {
            message: "Request timeout must be greater than 0".to_string(),
        });
    }

    if config.readiness.backoff_multiplier < 1.0 {
        return Err(PlayerError::Configuration {
            message: "Backoff multiplier must be at least 1.0".to_string(),
        });
    }

    if config.readiness.max_delay < config.readiness.retry_delay {
        return Err(PlayerError::Configuration {
            message: "Max retry delay must not be shorter than the retry delay".to_string(),
        });
    }

    if config.stream.mime_codec.trim().is_empty() {
        return Err(PlayerError::Configuration {
            message: "MIME codec string cannot be empty".to_string(),
        });
    }

    if config.stream.max_segments == Some(0) {
        return Err(PlayerError::Configuration {
            message: "Max segments must be greater than 0 when set".to_string(),
        });
    }

    Ok(())
}

/// Environment-based configuration override
pub struct EnvConfigOverride;

impl EnvConfigOverride {
    pub fn apply_overrides(config: &mut PlayerConfig) {
        Self::apply_from(config, |key| std::env::var(key).ok());
    }

    /// Apply overrides read through `lookup`
    pub fn apply_from<F>(config: &mut PlayerConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("LIVE_PLAYER_BACKEND_URL") {
            config.backend.base_url = url;
        }
        if let Some(transport) = lookup("LIVE_PLAYER_TRANSPORT") {
            match transport.parse::<TransportKind>() {
                Ok(kind) => config.stream.transport = kind,
                Err(e) => tracing::warn!("Ignoring LIVE_PLAYER_TRANSPORT: {}", e),
            }
        }
        if let Some(retries) = lookup("LIVE_PLAYER_MAX_RETRIES") {
            if let Ok(retries) = retries.parse::<u32>() {
                config.readiness.max_retries = retries;
            }
        }
        if let Some(dir) = lookup("LIVE_PLAYER_OUTPUT_DIR") {
            config.output.directory = PathBuf::from(dir);
        }
        if let Some(level) = lookup("LIVE_PLAYER_LOG_LEVEL") {
            config.logging.level = level;
        }
    }
}
