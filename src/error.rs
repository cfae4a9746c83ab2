use thiserror::Error;

use crate::message::GraphError;

/// Error types for the graphqlc-rs library
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("{0}")]
    GraphQL(#[from] GraphError),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("operation cancelled")]
    Cancelled,
}
