use async_trait::async_trait;

use crate::message::{GraphError, GraphResponse, MessageType, SubscribeMessage};
use crate::subscription::Results;

/// A subscription result classified for callback dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// An execution result from a `next` frame
    Next(GraphResponse),
    /// The server rejected or aborted the operation
    Error(Vec<GraphError>),
    /// The server completed the operation
    Completed,
    /// The session failed locally at `stage`
    Failed { stage: MessageType, reason: String },
}

impl SubscriptionEvent {
    pub fn from_message(message: SubscribeMessage) -> Self {
        match message.kind {
            MessageType::Next => match message.response() {
                Ok(response) => Self::Next(response),
                Err(e) => Self::Failed {
                    stage: MessageType::Next,
                    reason: e.to_string(),
                },
            },
            MessageType::Error => match message.errors() {
                Ok(errors) => Self::Error(errors),
                Err(e) => Self::Failed {
                    stage: MessageType::Error,
                    reason: e.to_string(),
                },
            },
            MessageType::Complete => Self::Completed,
            _ => {
                let reason = message
                    .response()
                    .ok()
                    .and_then(|response| response.errors.into_iter().next())
                    .map(|error| error.message)
                    .unwrap_or_default();
                Self::Failed {
                    stage: message.kind,
                    reason,
                }
            }
        }
    }
}

/// Event handler trait for receiving subscription results as callbacks
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called for every execution result
    async fn on_next(&self, response: GraphResponse);

    /// Called when the server reports operation errors
    async fn on_error(&self, errors: Vec<GraphError>);

    /// Called when the server completes the operation
    async fn on_complete(&self) {}

    /// Called when the session fails locally
    async fn on_failure(&self, stage: &MessageType, reason: &str);
}

impl Results {
    /// Feed every result to `handler` until the stream ends
    pub async fn dispatch<H: EventHandler + ?Sized>(&self, handler: &H) {
        while let Some(message) = self.next().await {
            match SubscriptionEvent::from_message(message) {
                SubscriptionEvent::Next(response) => handler.on_next(response).await,
                SubscriptionEvent::Error(errors) => handler.on_error(errors).await,
                SubscriptionEvent::Completed => handler.on_complete().await,
                SubscriptionEvent::Failed { stage, reason } => {
                    handler.on_failure(&stage, &reason).await
                }
            }
        }
    }
}
