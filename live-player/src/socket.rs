use async_trait::async_trait;
use bytes::Bytes;
use common::{ClientCommand, ServerFrame};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;
use crate::errors::TransportError;

/// A decoded message from the live socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketMessage {
    Segment(Bytes),
    EndOfStream,
}

impl From<ServerFrame> for SocketMessage {
    fn from(frame: ServerFrame) -> Self {
        match frame {
            ServerFrame::Segment(data) => SocketMessage::Segment(data),
            ServerFrame::EndOfStream => SocketMessage::EndOfStream,
        }
    }
}

/// One open live socket
#[async_trait]
pub trait SegmentSocket: Send {
    /// Sends one `"next"` command
    async fn request_next(&mut self) -> Result<(), TransportError>;

    /// Next decoded message; `None` when the peer closed without a close frame
    async fn recv(&mut self) -> Option<Result<SocketMessage, TransportError>>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens live sockets
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Box<dyn SegmentSocket>, TransportError>;
}

/// tokio-tungstenite connector
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SocketConnector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn SegmentSocket>, TransportError> {
        let (stream, response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        debug!(%url, status = response.status().as_u16(), "Live socket connected");
        Ok(Box::new(WsSegmentSocket { stream }))
    }
}

pub struct WsSegmentSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl SegmentSocket for WsSegmentSocket {
    async fn request_next(&mut self) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(ClientCommand::NextSegment.as_str().to_string()))
            .await
            .map_err(|e| TransportError::Socket {
                reason: e.to_string(),
            })
    }

    async fn recv(&mut self) -> Option<Result<SocketMessage, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => {
                    return Some(Err(TransportError::Socket {
                        reason: e.to_string(),
                    }))
                }
            };

            let decoded = match message {
                Message::Binary(data) => ServerFrame::from_binary(Bytes::from(data)),
                Message::Text(text) => ServerFrame::from_text(&text),
                Message::Close(frame) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                        None => (None, String::new()),
                    };
                    return Some(Err(TransportError::ConnectionClosed { code, reason }));
                }
                other => {
                    trace!("Skipping control frame: {:?}", other);
                    continue;
                }
            };

            return Some(decoded.map(SocketMessage::from).map_err(TransportError::from));
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Socket {
                reason: e.to_string(),
            }),
        }
    }
}
