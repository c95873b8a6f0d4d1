use crate::error::ProtocolError;
use crate::types::CameraId;
use bytes::Bytes;

/// 请求下一个分片的命令（客户端 -> 服务端）
pub const NEXT_SEGMENT_COMMAND: &str = "next";

/// 直播结束标记（服务端 -> 客户端，文本帧）
pub const END_OF_STREAM: &str = "end";

pub const CAMERAS_PATH: &str = "cameras/";
pub const ADD_CAMERA_PATH: &str = "cameras/add_camera";

/// 就绪检查路径
pub fn ready_path(id: CameraId) -> String {
    format!("cameras/{}/ready", id)
}

/// 单个摄像头记录路径
pub fn camera_path(id: CameraId) -> String {
    format!("cameras/{}/", id)
}

/// 直播套接字路径
pub fn live_path(id: CameraId) -> String {
    format!("cameras/{}/live", id)
}

/// 客户端命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    NextSegment,
}

impl ClientCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientCommand::NextSegment => NEXT_SEGMENT_COMMAND,
        }
    }

    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        match text.trim() {
            NEXT_SEGMENT_COMMAND => Ok(ClientCommand::NextSegment),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

/// 服务端帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// 一个可直接追加的媒体分片
    Segment(Bytes),
    EndOfStream,
}

impl ServerFrame {
    pub fn from_binary(data: Bytes) -> Result<Self, ProtocolError> {
        if data.is_empty() {
            return Err(ProtocolError::EmptySegment);
        }
        Ok(ServerFrame::Segment(data))
    }

    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        if text.trim() == END_OF_STREAM {
            Ok(ServerFrame::EndOfStream)
        } else {
            Err(ProtocolError::UnexpectedText(text.to_string()))
        }
    }
}
