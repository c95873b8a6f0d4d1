use common::CameraId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Camera not found: {id}")]
    CameraNotFound { id: CameraId },

    #[error("Unable to create camera: {reason}")]
    InvalidCamera { reason: String },

    #[error("Invalid path component: {component}")]
    InvalidPath { component: String },

    #[error("Storage error at {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BackendError>;

impl BackendError {
    pub fn storage(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        BackendError::Storage {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
