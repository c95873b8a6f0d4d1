use common::{CameraId, ProtocolError};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timed out: {url}")]
    Timeout { url: String },

    #[error("Unexpected status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Invalid response body: {message}")]
    InvalidBody { message: String },

    #[error("Invalid URL: {message}")]
    InvalidUrl { message: String },
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        let url = error
            .url()
            .map(|url| url.to_string())
            .unwrap_or_default();

        if error.is_timeout() {
            ApiError::Timeout { url }
        } else if error.is_decode() {
            ApiError::InvalidBody {
                message: error.to_string(),
            }
        } else if let Some(status) = error.status() {
            ApiError::Status {
                status: status.as_u16(),
                url,
            }
        } else {
            ApiError::Network {
                message: error.to_string(),
            }
        }
    }
}

impl From<url::ParseError> for ApiError {
    fn from(error: url::ParseError) -> Self {
        ApiError::InvalidUrl {
            message: error.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Unsupported MIME type or codec: {mime}")]
    UnsupportedMimeType { mime: String },

    #[error("MediaSource error: {message}")]
    MediaSource { message: String },

    #[error("SourceBuffer error: {message}")]
    SourceBuffer { message: String },

    #[error("Buffer is not accepting appends: {reason}")]
    InvalidState { reason: String },

    #[error("Playlist error: {message}")]
    Playlist { message: String },
}

#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Failed to open live socket {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Live socket error: {reason}")]
    Socket { reason: String },

    #[error("Live socket closed unexpectedly (code {code:?}): {reason}")]
    ConnectionClosed { code: Option<u16>, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{0}")]
    Media(#[from] MediaError),

    #[error("Player error: {message}")]
    Player { message: String },
}

#[derive(Error, Debug, Clone)]
pub enum ContinuationError {
    #[error("Failed to fetch the next playlist of camera {camera_id}: {source}")]
    Fetch { camera_id: CameraId, source: ApiError },

    #[error("Camera {camera_id} reported no active playlist")]
    NoActivePlaylist { camera_id: CameraId },
}

#[derive(Error, Debug, Clone)]
pub enum PlayerError {
    #[error(
        "Unable to load the camera's livestream (camera {camera_id}, {attempts} attempts, last: {last_error}). \
         Try refreshing the page! If the problem persists, check whether the camera's data is being recorded."
    )]
    NotReady {
        camera_id: CameraId,
        attempts: u32,
        last_error: String,
    },

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    ContinuationFetch(#[from] ContinuationError),

    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Session cancelled")]
    Cancelled,
}

impl PlayerError {
    /// 是否为会话终止性错误
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PlayerError::ContinuationFetch(_) | PlayerError::Cancelled)
    }
}
