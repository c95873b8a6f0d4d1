use thiserror::Error;

/// 直播套接字协议错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown client command: {0}")]
    UnknownCommand(String),

    #[error("Unexpected text frame from server: {0}")]
    UnexpectedText(String),

    #[error("Empty segment frame")]
    EmptySegment,
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
