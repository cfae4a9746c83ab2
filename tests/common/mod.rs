//! Common test utilities for graphqlc-rs integration tests
//!
//! Provides a scripted graphql-ws server that accepts a single connection.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{Notify, watch};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;

/// One action of the scripted server
pub enum Step {
    /// Wait for the next client frame
    Expect,
    /// Send a raw text frame
    Send(String),
}

pub fn send(text: &str) -> Step {
    Step::Send(text.to_string())
}

#[derive(Default)]
struct Recorded {
    frames: Vec<Value>,
    protocol: Option<String>,
    close_reason: Option<String>,
}

/// A graphql-ws server that plays a fixed script, then idles until the
/// client closes the socket
pub struct MockGraphqlServer {
    pub addr: SocketAddr,
    recorded: Arc<Mutex<Recorded>>,
    finished: watch::Receiver<bool>,
    shutdown: Arc<Notify>,
}

impl MockGraphqlServer {
    pub async fn start(script: Vec<Step>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let shutdown = Arc::new(Notify::new());
        let (done, finished) = watch::channel(false);

        let task_recorded = Arc::clone(&recorded);
        let task_shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            tokio::select! {
                accepted = listener.accept() => {
                    if let Ok((stream, _)) = accepted {
                        Self::handle_connection(stream, script, task_recorded).await;
                    }
                }
                _ = task_shutdown.notified() => {}
            }
            let _ = done.send(true);
        });

        Self {
            addr,
            recorded,
            finished,
            shutdown,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        script: Vec<Step>,
        recorded: Arc<Mutex<Recorded>>,
    ) {
        let handshake_recorded = Arc::clone(&recorded);
        let callback = move |request: &Request,
                             mut response: Response|
              -> Result<Response, ErrorResponse> {
            if let Some(protocol) = request.headers().get("Sec-WebSocket-Protocol") {
                handshake_recorded.lock().unwrap().protocol =
                    protocol.to_str().ok().map(str::to_string);
                response.headers_mut().insert(
                    "Sec-WebSocket-Protocol",
                    HeaderValue::from_static("graphql-transport-ws"),
                );
            }
            Ok(response)
        };

        let mut ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        for step in script {
            match step {
                Step::Expect => {
                    if !Self::read_frame(&mut ws, &recorded).await {
                        return;
                    }
                }
                Step::Send(text) => {
                    if ws.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
            }
        }

        while Self::read_frame(&mut ws, &recorded).await {}
    }

    // Returns false once the connection is gone.
    async fn read_frame(
        ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
        recorded: &Arc<Mutex<Recorded>>,
    ) -> bool {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let frame = serde_json::from_str(&text).unwrap_or(Value::String(text));
                    recorded.lock().unwrap().frames.push(frame);
                    return true;
                }
                Some(Ok(Message::Close(frame))) => {
                    recorded.lock().unwrap().close_reason =
                        Some(frame.map(|f| f.reason.to_string()).unwrap_or_default());
                    return false;
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return false,
            }
        }
    }

    /// URL with an http scheme, exercising ws normalization
    pub fn http_url(&self) -> String {
        format!("http://{}/graphql", self.addr)
    }

    pub fn frames(&self) -> Vec<Value> {
        self.recorded.lock().unwrap().frames.clone()
    }

    pub fn frame_types(&self) -> Vec<String> {
        self.frames()
            .iter()
            .map(|frame| frame["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn requested_protocol(&self) -> Option<String> {
        self.recorded.lock().unwrap().protocol.clone()
    }

    pub fn close_reason(&self) -> Option<String> {
        self.recorded.lock().unwrap().close_reason.clone()
    }

    /// Wait until the server received `count` client frames
    pub async fn wait_for_frames(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.frames().len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("client frames in time");
    }

    /// Wait until the connection handler returned
    pub async fn wait_finished(&self) {
        let mut finished = self.finished.clone();
        tokio::time::timeout(Duration::from_secs(5), finished.wait_for(|done| *done))
            .await
            .expect("server finished in time")
            .expect("server task alive");
    }
}

impl Drop for MockGraphqlServer {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
    }
}

/// Address nothing listens on
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
