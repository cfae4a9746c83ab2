//! GraphQL client for queries and mutations over HTTP and subscriptions over
//! the graphql-ws (`graphql-transport-ws`) protocol.
//!
//! ```ignore
//! use std::sync::Arc;
//! use graphqlc_rs::{Client, ClientConfig, Decode, GraphRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = Client::new(ClientConfig::new("https://snowtooth.example.com/graphql")?)?;
//!
//! let request = GraphRequest::new("query { allLifts { id name } }", None);
//! let lifts: AllLifts = client.execute(&request).await.decode()?;
//!
//! let request = GraphRequest::new("subscription { liftStatusChange { id } }", None);
//! let subscription = Arc::new(client.subscription(&request));
//! let results = subscription.results();
//!
//! let cancel = CancellationToken::new();
//! let runner = Arc::clone(&subscription);
//! tokio::spawn(async move { runner.run(cancel).await });
//!
//! while let Some(result) = results.next().await {
//!     match result.decode::<LiftStatusChange>() {
//!         Ok(change) => println!("{:?}", change),
//!         Err(e) => break,
//!     }
//! }
//! subscription.stop().await;
//! ```

mod client;
mod config;
mod connection;
mod error;
mod event;
mod message;
mod subscription;

pub use client::Client;
pub use config::{ClientConfig, http_endpoint, ws_endpoint};
pub use connection::{
    Connector, GRAPHQL_TRANSPORT_WS, Transport, WebSocketConnection, WebSocketConnector,
};
pub use error::ClientError;
pub use event::{EventHandler, SubscriptionEvent};
pub use message::{Decode, GraphError, GraphRequest, GraphResponse, MessageType, SubscribeMessage};
pub use subscription::{Results, Subscription};
