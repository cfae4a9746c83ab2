use std::collections::HashMap;
use std::time::Duration;

use url::{Position, Url};

use crate::error::ClientError;

/// Immutable client configuration, built once and handed to [`crate::Client`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Url,
    pub headers: HashMap<String, String>,
    /// Total time allowed for one HTTP round-trip
    pub request_timeout: Option<Duration>,
    /// Time allowed to open a subscription socket
    pub connect_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Create a configuration for the GraphQL endpoint at `url`
    ///
    /// The scheme may be `http`, `https`, `ws` or `wss`; each transport picks
    /// the matching variant when a call is made.
    pub fn new(url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            endpoint: Url::parse(url)?,
            headers: HashMap::new(),
            request_timeout: None,
            connect_timeout: None,
        })
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add several headers at once
    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

/// Endpoint for one-shot requests: `ws`/`wss` become `http`/`https`, any
/// other scheme is forced to `https`
pub fn http_endpoint(endpoint: &Url) -> Result<Url, ClientError> {
    match endpoint.scheme() {
        "http" | "https" => Ok(endpoint.clone()),
        "ws" => with_scheme(endpoint, "http"),
        _ => with_scheme(endpoint, "https"),
    }
}

/// Endpoint for subscriptions: `http`/`https` become `ws`/`wss`, any other
/// scheme is forced to `wss`
pub fn ws_endpoint(endpoint: &Url) -> Result<Url, ClientError> {
    match endpoint.scheme() {
        "ws" | "wss" => Ok(endpoint.clone()),
        "http" => with_scheme(endpoint, "ws"),
        _ => with_scheme(endpoint, "wss"),
    }
}

// Url::set_scheme refuses to move between special and non-special schemes,
// so the URL is rebuilt from its text instead.
fn with_scheme(endpoint: &Url, scheme: &str) -> Result<Url, ClientError> {
    let rest = &endpoint[Position::AfterScheme..];
    Url::parse(&format!("{}{}", scheme, rest))
        .map_err(|e| ClientError::InvalidEndpoint(format!("{}: {}", endpoint, e)))
}
