//! graphql-ws subscription engine.
//!
//! A [`Subscription`] drives exactly one socket through the
//! `connection_init` / `connection_ack` handshake, starts a single operation,
//! answers keepalive pings and publishes every result, in wire order, on a
//! bounded output channel. Failures never escape [`Subscription::run`]: they
//! are published as synthetic frames whose payload is a GraphQL error
//! envelope tagged with the stage that failed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;
use uuid::Uuid;

use crate::config::ws_endpoint;
use crate::connection::{Connector, GRAPHQL_TRANSPORT_WS, Transport, WebSocketConnector};
use crate::error::ClientError;
use crate::message::{GraphRequest, MessageType, SubscribeMessage};

// A single slot: the engine waits for the consumer after every result.
const OUTPUT_CAPACITY: usize = 1;

struct Session<T> {
    transport: Option<T>,
    reason: String,
}

/// One graphql-ws subscription bound to one socket
pub struct Subscription<C: Connector = WebSocketConnector> {
    endpoint: Url,
    headers: Option<HashMap<String, String>>,
    request: GraphRequest,
    connector: C,
    session: Mutex<Session<C::Transport>>,
    outbox: Mutex<Option<mpsc::Sender<SubscribeMessage>>>,
    results: Results,
    shutdown: CancellationToken,
}

enum Flow {
    Continue,
    Stop,
}

impl<C: Connector> Subscription<C> {
    /// Create a subscription that dials through `connector`
    ///
    /// `endpoint` is normalized to `ws`/`wss` when the subscription runs.
    pub fn new(
        endpoint: Url,
        headers: Option<HashMap<String, String>>,
        request: GraphRequest,
        connector: C,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(OUTPUT_CAPACITY);
        Self {
            endpoint,
            headers,
            request,
            connector,
            session: Mutex::new(Session {
                transport: None,
                reason: String::new(),
            }),
            outbox: Mutex::new(Some(sender)),
            results: Results {
                receiver: Arc::new(Mutex::new(receiver)),
            },
            shutdown: CancellationToken::new(),
        }
    }

    /// Handle to the ordered result stream
    pub fn results(&self) -> Results {
        self.results.clone()
    }

    /// Drive the subscription until it terminates or `cancel` fires
    ///
    /// Never fails directly; every failure is published as a result. The
    /// output stream stays open until [`Subscription::stop`] is called.
    pub async fn run(&self, cancel: CancellationToken) {
        if let Err(e) = self.init(&cancel).await {
            warn!("Failed to initialize subscription: {}", e);
            self.terminate(&cancel, None, MessageType::ConnectionInit, e)
                .await;
            return;
        }

        loop {
            let message = match self.receive(&cancel).await {
                Ok(message) => message,
                Err(e) => {
                    warn!("Failed to read subscription message: {}", e);
                    self.terminate(&cancel, None, MessageType::InvalidMessage, e)
                        .await;
                    return;
                }
            };

            if let Flow::Stop = self.handle(&cancel, message).await {
                return;
            }
        }
    }

    /// Close the transport and the output stream
    ///
    /// Safe to call repeatedly, and after the subscription ended on its own.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        {
            let mut session = self.session.lock().await;
            if let Some(mut transport) = session.transport.take() {
                debug!("Closing subscription transport: {:?}", session.reason);
                if let Err(e) = transport.close(&session.reason).await {
                    warn!("Error closing subscription transport: {}", e);
                }
            }
        }

        if self.outbox.lock().await.take().is_some() {
            debug!("Subscription result stream closed");
        }
    }

    async fn init(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        let endpoint = ws_endpoint(&self.endpoint)?;
        let mut transport = self
            .guarded(cancel, self.connector.dial(&endpoint, GRAPHQL_TRANSPORT_WS))
            .await??;

        let init = SubscribeMessage::connection_init(self.headers.as_ref());
        let sent = self
            .guarded(cancel, transport.send(&init))
            .await
            .and_then(|sent| sent);
        if let Err(e) = sent {
            let _ = transport.close(&e.to_string()).await;
            return Err(e);
        }
        debug!("Sent connection_init to {}", endpoint);

        let mut session = self.session.lock().await;
        if self.shutdown.is_cancelled() {
            // stop() already ran; nobody else will close this socket
            let _ = transport.close("").await;
            return Err(ClientError::Cancelled);
        }
        session.transport = Some(transport);
        Ok(())
    }

    async fn handle(&self, cancel: &CancellationToken, message: SubscribeMessage) -> Flow {
        let kind = message.kind.clone();
        match kind {
            MessageType::ConnectionAck => {
                debug!("Connection acknowledged");
                match self.subscribe(cancel).await {
                    Ok(()) => Flow::Continue,
                    Err(e) => {
                        self.terminate(cancel, None, MessageType::Subscribe, e)
                            .await;
                        Flow::Stop
                    }
                }
            }
            MessageType::Ping => {
                debug!("Received ping");
                let pong = SubscribeMessage::new(MessageType::Pong);
                match self.send(cancel, &pong).await {
                    Ok(()) => Flow::Continue,
                    Err(e) => {
                        self.terminate(cancel, None, MessageType::Pong, e).await;
                        Flow::Stop
                    }
                }
            }
            MessageType::Pong => {
                trace!("Received pong");
                Flow::Continue
            }
            MessageType::Next => {
                if self.publish(cancel, message).await {
                    Flow::Continue
                } else {
                    Flow::Stop
                }
            }
            MessageType::Error => {
                // no `complete` follows an `error`, the operation is over
                self.publish(cancel, message).await;
                self.record("operation failed").await;
                Flow::Stop
            }
            MessageType::Complete => {
                self.terminate(cancel, message.id, MessageType::Complete, "server completed")
                    .await;
                Flow::Stop
            }
            kind => {
                warn!("Unknown message type: {}", kind);
                self.terminate(cancel, message.id, kind, "unknown message type")
                    .await;
                Flow::Stop
            }
        }
    }

    async fn subscribe(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        let payload = serde_json::to_value(&self.request)?;
        let message = SubscribeMessage::new(MessageType::Subscribe)
            .with_id(Uuid::new_v4().to_string())
            .with_payload(payload);
        self.send(cancel, &message).await?;
        debug!("Subscribed with id {:?}", message.id);
        Ok(())
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        message: &SubscribeMessage,
    ) -> Result<(), ClientError> {
        let mut session = self.session.lock().await;
        let transport = session
            .transport
            .as_mut()
            .ok_or_else(|| ClientError::Connection("transport closed".to_string()))?;
        self.guarded(cancel, transport.send(message)).await?
    }

    async fn receive(&self, cancel: &CancellationToken) -> Result<SubscribeMessage, ClientError> {
        let mut session = self.session.lock().await;
        let transport = session
            .transport
            .as_mut()
            .ok_or_else(|| ClientError::Connection("transport closed".to_string()))?;
        self.guarded(cancel, transport.receive()).await?
    }

    /// Record why the session ended and report it as a synthetic result
    ///
    /// `id` is the id of the received frame that ended the session, if any.
    async fn terminate(
        &self,
        cancel: &CancellationToken,
        id: Option<String>,
        kind: MessageType,
        reason: impl std::fmt::Display,
    ) {
        let reason = reason.to_string();
        self.record(&reason).await;
        let mut failure = SubscribeMessage::failure(kind, &reason);
        failure.id = id;
        self.publish(cancel, failure).await;
    }

    async fn record(&self, reason: &str) {
        self.session.lock().await.reason = reason.to_string();
    }

    /// Hand a result to the consumer, waiting for room in the channel
    ///
    /// Returns `false` when the item could not be delivered.
    async fn publish(&self, cancel: &CancellationToken, message: SubscribeMessage) -> bool {
        let outbox = self.outbox.lock().await;
        let Some(sender) = outbox.as_ref() else {
            debug!("Dropping result, stream already closed");
            return false;
        };

        if cancel.is_cancelled() || self.shutdown.is_cancelled() {
            return sender.try_send(message).is_ok();
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.shutdown.cancelled() => false,
            sent = sender.send(message) => sent.is_ok(),
        }
    }

    /// Race `future` against the caller's token and `stop()`
    async fn guarded<F: Future>(
        &self,
        cancel: &CancellationToken,
        future: F,
    ) -> Result<F::Output, ClientError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            _ = self.shutdown.cancelled() => Err(ClientError::Cancelled),
            output = future => Ok(output),
        }
    }
}

/// Read side of a subscription's output channel
///
/// Results arrive in the order frames were read from the socket. The stream
/// ends once the subscription is stopped and every queued item was taken.
#[derive(Clone)]
pub struct Results {
    receiver: Arc<Mutex<mpsc::Receiver<SubscribeMessage>>>,
}

impl Results {
    /// Wait for the next result, `None` at end of stream
    pub async fn next(&self) -> Option<SubscribeMessage> {
        self.receiver.lock().await.recv().await
    }

    /// Consume the handle as a [`Stream`] of results
    pub fn into_stream(self) -> impl Stream<Item = SubscribeMessage> {
        futures_util::stream::unfold(self, |results| async move {
            let message = results.next().await?;
            Some((message, results))
        })
    }
}
