use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace};
use url::Url;

use crate::error::ClientError;
use crate::message::SubscribeMessage;

/// Subprotocol negotiated for graphql-ws sockets
pub const GRAPHQL_TRANSPORT_WS: &str = "graphql-transport-ws";

// Close reasons travel in a control frame: 125 bytes minus the status code.
const MAX_CLOSE_REASON: usize = 123;

/// One connected full-duplex session carrying protocol messages
#[async_trait]
pub trait Transport: Send {
    /// Send a single protocol message
    async fn send(&mut self, message: &SubscribeMessage) -> Result<(), ClientError>;

    /// Wait for the next protocol message
    async fn receive(&mut self) -> Result<SubscribeMessage, ClientError>;

    /// Close the session with a normal-closure reason
    async fn close(&mut self, reason: &str) -> Result<(), ClientError>;
}

/// Opens transport sessions
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport;

    /// Dial `endpoint`, requesting `subprotocol`
    async fn dial(&self, endpoint: &Url, subprotocol: &str)
    -> Result<Self::Transport, ClientError>;
}

/// Dials graphql-ws endpoints over tokio-tungstenite
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the time spent on the TCP, TLS and upgrade handshake
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketConnection;

    async fn dial(
        &self,
        endpoint: &Url,
        subprotocol: &str,
    ) -> Result<WebSocketConnection, ClientError> {
        let mut request = endpoint.as_str().into_client_request()?;
        let protocol = HeaderValue::from_str(subprotocol)
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", protocol);

        info!("Connecting to GraphQL endpoint at {}", endpoint);

        let connect = connect_async(request);
        let result = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect).await.map_err(|_| {
                ClientError::Connection(format!("timed out after {:?}", timeout))
            })?,
            None => connect.await,
        };

        let (stream, response) = result.map_err(|e| {
            error!("Failed to connect to WebSocket server: {}", e);
            e
        })?;

        debug!("Connected to WebSocket server. Response: {:?}", response);

        Ok(WebSocketConnection { stream })
    }
}

/// A graphql-ws session over a WebSocket stream
pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WebSocketConnection {
    async fn send(&mut self, message: &SubscribeMessage) -> Result<(), ClientError> {
        let text = message.to_text()?;
        trace!("Sending message: {}", text);
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<SubscribeMessage, ClientError> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => {
                    trace!("Received message: {}", text);
                    return SubscribeMessage::from_text(&text);
                }
                Message::Binary(data) => {
                    trace!("Received binary message of {} bytes", data.len());
                    return Ok(serde_json::from_slice(&data)?);
                }
                Message::Close(frame) => {
                    let reason = match frame {
                        Some(frame) => format!("closed by server: {} {}", frame.code, frame.reason),
                        None => "closed by server".to_string(),
                    };
                    return Err(ClientError::Connection(reason));
                }
                // tungstenite queues the pong for socket-level pings itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }

        Err(ClientError::Connection("connection closed".to_string()))
    }

    async fn close(&mut self, reason: &str) -> Result<(), ClientError> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: truncate_reason(reason).to_string().into(),
        };

        match self.stream.close(Some(frame)).await {
            Ok(()) => Ok(()),
            Err(
                tokio_tungstenite::tungstenite::Error::AlreadyClosed
                | tokio_tungstenite::tungstenite::Error::ConnectionClosed,
            ) => {
                debug!("WebSocket already closed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}
