use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::error::ClientError;

/// Standard GraphQL POST request body
///
/// See <https://graphql.org/learn/serving-over-http/#post-request>.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
    /// Only required when the document contains several named operations.
    #[serde(
        rename = "operationName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_name: Option<String>,
}

impl GraphRequest {
    /// Create a request from a document and optional variables
    pub fn new(query: impl Into<String>, variables: Option<Map<String, Value>>) -> Self {
        Self {
            query: query.into(),
            variables,
            operation_name: None,
        }
    }

    /// Select the operation to run in a multi-operation document
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// Anything that can be decoded into a caller-provided shape
pub trait Decode {
    /// Decode the payload into `T`, failing with the first embedded GraphQL error
    fn decode<T: DeserializeOwned>(&self) -> Result<T, ClientError>;
}

/// A GraphQL error as carried in the `errors` array of a response
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct GraphError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }
}

/// Standard GraphQL response envelope
///
/// See <https://graphql.org/learn/serving-over-http/#response>. Only a JSON
/// object is accepted as an envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct GraphResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphError>,
}

impl TryFrom<Map<String, Value>> for GraphResponse {
    type Error = serde_json::Error;

    fn try_from(mut envelope: Map<String, Value>) -> Result<Self, Self::Error> {
        let data = envelope.remove("data").filter(|data| !data.is_null());
        let errors = match envelope.remove("errors") {
            None | Some(Value::Null) => Vec::new(),
            Some(errors) => serde_json::from_value(errors)?,
        };
        Ok(Self { data, errors })
    }
}

impl GraphResponse {
    /// Envelope carrying a single error and no data
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            data: None,
            errors: vec![GraphError::new(message)],
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn first_error(&self) -> Option<&GraphError> {
        self.errors.first()
    }
}

impl Decode for GraphResponse {
    fn decode<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        // A populated `errors` invalidates `data`, even partial data.
        if let Some(error) = self.errors.first() {
            return Err(ClientError::GraphQL(error.clone()));
        }

        let data = self.data.clone().unwrap_or(Value::Null);
        Ok(serde_json::from_value(data)?)
    }
}

/// graphql-ws message types
///
/// See <https://github.com/enisdenjo/graphql-ws/blob/master/PROTOCOL.md>.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// Client -> Server: asks the server to accept future operations on this socket
    ConnectionInit,
    /// Server -> Client: acknowledges `connection_init`
    ConnectionAck,
    /// Bidirectional keepalive
    Ping,
    /// Bidirectional reply to `ping`
    Pong,
    /// Client -> Server: starts the operation carried in the payload
    Subscribe,
    /// Server -> Client: one execution result
    Next,
    /// Server -> Client: execution errors, no `complete` follows
    Error,
    /// Bidirectional: the operation has finished
    Complete,
    /// Local failure tag, never sent on the wire
    InvalidMessage,
    /// Any type this client does not know about
    Unknown(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ConnectionInit => "connection_init",
            Self::ConnectionAck => "connection_ack",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Subscribe => "subscribe",
            Self::Next => "next",
            Self::Error => "error",
            Self::Complete => "complete",
            Self::InvalidMessage => "invalid_message",
            Self::Unknown(kind) => kind,
        }
    }
}

impl From<String> for MessageType {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "connection_init" => Self::ConnectionInit,
            "connection_ack" => Self::ConnectionAck,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "subscribe" => Self::Subscribe,
            "next" => Self::Next,
            "error" => Self::Error,
            "complete" => Self::Complete,
            "invalid_message" => Self::InvalidMessage,
            _ => Self::Unknown(kind),
        }
    }
}

impl From<MessageType> for String {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::Unknown(kind) => kind,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One graphql-ws frame
///
/// The payload is kept as opaque JSON; its shape depends on `kind` and is
/// only interpreted on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub payload: Option<Value>,
}

impl SubscribeMessage {
    pub fn new(kind: MessageType) -> Self {
        Self {
            id: None,
            kind,
            payload: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// `connection_init` frame, carrying `{"headers": ...}` when headers are given
    pub fn connection_init(headers: Option<&HashMap<String, String>>) -> Self {
        let message = Self::new(MessageType::ConnectionInit);
        match headers {
            Some(headers) => message.with_payload(json!({ "headers": headers })),
            None => message,
        }
    }

    /// Synthetic frame reporting a local failure through the result stream
    pub fn failure(kind: MessageType, reason: impl fmt::Display) -> Self {
        let message = format!("{kind}: {reason}");
        Self::new(kind).with_payload(json!({ "errors": [{ "message": message }] }))
    }

    pub fn to_text(&self) -> Result<String, ClientError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_text(text: &str) -> Result<Self, ClientError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Interpret the payload as a GraphQL response envelope
    pub fn response(&self) -> Result<GraphResponse, ClientError> {
        let payload = self.payload.clone().unwrap_or(Value::Null);
        Ok(serde_json::from_value(payload)?)
    }

    /// Interpret the payload of an `error` frame
    pub fn errors(&self) -> Result<Vec<GraphError>, ClientError> {
        let payload = self.payload.clone().unwrap_or(Value::Null);
        Ok(serde_json::from_value(payload)?)
    }
}

impl Decode for SubscribeMessage {
    fn decode<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        if self.kind == MessageType::Error {
            let errors = self.errors()?;
            let error = errors
                .into_iter()
                .next()
                .unwrap_or_else(|| GraphError::new("error: empty error payload"));
            return Err(ClientError::GraphQL(error));
        }

        self.response()?.decode()
    }
}

// Keeps an explicit `null` payload distinct from an absent one.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
