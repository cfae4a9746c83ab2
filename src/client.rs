use reqwest::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, http_endpoint};
use crate::connection::WebSocketConnector;
use crate::error::ClientError;
use crate::message::{GraphRequest, GraphResponse};
use crate::subscription::Subscription;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// GraphQL client for one endpoint
///
/// Queries and mutations go over a single HTTP POST, subscriptions over a
/// graphql-ws socket.
pub struct Client {
    config: ClientConfig,
    http_client: HttpClient,
}

impl Client {
    /// Create a new client from an immutable configuration
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            config,
            http_client: builder.build()?,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Execute a query or mutation
    ///
    /// Never fails: transport and decoding failures come back as a response
    /// whose `errors` holds a single entry describing the failure.
    pub async fn execute(&self, request: &GraphRequest) -> GraphResponse {
        match self.try_execute(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("GraphQL request failed: {}", e);
                GraphResponse::failure(e.to_string())
            }
        }
    }

    async fn try_execute(&self, request: &GraphRequest) -> Result<GraphResponse, ClientError> {
        let url = http_endpoint(&self.config.endpoint)?;
        info!("Executing GraphQL request against {}", url);

        let mut builder = self
            .http_client
            .post(url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE);
        for (name, value) in &self.config.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.json(request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!("Received {} byte response with status {}", body.len(), status);

        match serde_json::from_slice::<GraphResponse>(&body) {
            Ok(response) => Ok(response),
            Err(e) if !status.is_success() => {
                Err(ClientError::Connection(format!("HTTP {}: {}", status, e)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Prepare a subscription for `request`
    ///
    /// Nothing is dialed until [`Subscription::run`] is called. Configured
    /// headers travel in the `connection_init` payload.
    pub fn subscription(&self, request: &GraphRequest) -> Subscription<WebSocketConnector> {
        let headers = if self.config.headers.is_empty() {
            None
        } else {
            Some(self.config.headers.clone())
        };
        let connector = WebSocketConnector::new().with_connect_timeout(self.config.connect_timeout);

        Subscription::new(
            self.config.endpoint.clone(),
            headers,
            request.clone(),
            connector,
        )
    }
}
