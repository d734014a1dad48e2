//! WebSocket Mock Server for the realtime endpoint
//!
//! Accepts connections, records the handshake's Authorization header, forwards
//! every client text message to the test and lets the test push server events
//! or close the socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

enum ServerCommand {
    Event(String),
    Close,
}

/// Shared state of the mock realtime endpoint
struct MockState {
    received: mpsc::UnboundedSender<Value>,
    commands: tokio::sync::Mutex<mpsc::UnboundedReceiver<ServerCommand>>,
    authorization: Mutex<Option<String>>,
    beta_header: Mutex<Option<String>>,
    request_uri: Mutex<Option<String>>,
    connections: Mutex<u32>,
    client_closed: Mutex<bool>,
    /// Delay before answering the WebSocket upgrade
    handshake_delay: Duration,
}

pub struct RealtimeMockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    received: mpsc::UnboundedReceiver<Value>,
    commands: mpsc::UnboundedSender<ServerCommand>,
    handle: JoinHandle<()>,
}

impl RealtimeMockServer {
    pub async fn start() -> Self {
        Self::start_with_handshake_delay(Duration::ZERO).await
    }

    /// Server that holds every upgrade request for `delay` before answering.
    pub async fn start_with_handshake_delay(delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (received_tx, received_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let state = Arc::new(MockState {
            received: received_tx,
            commands: tokio::sync::Mutex::new(commands_rx),
            authorization: Mutex::new(None),
            beta_header: Mutex::new(None),
            request_uri: Mutex::new(None),
            connections: Mutex::new(0),
            client_closed: Mutex::new(false),
            handshake_delay: delay,
        });

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        eprintln!("Mock realtime connection error: {}", e);
                    }
                });
            }
        });

        Self {
            addr,
            state,
            received: received_rx,
            commands: commands_tx,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }

    /// Next client message, or `None` if nothing arrives within `wait`.
    pub async fn next_message(&mut self, wait: Duration) -> Option<Value> {
        tokio::time::timeout(wait, self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next client message of the given type, skipping others.
    pub async fn next_message_of(&mut self, event_type: &str, wait: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let msg = self.next_message(remaining).await?;
            if msg["type"] == event_type {
                return Some(msg);
            }
        }
    }

    /// Push a server event to the connected client.
    pub fn push(&self, event: Value) {
        let _ = self.commands.send(ServerCommand::Event(event.to_string()));
    }

    /// Push a raw text frame.
    pub fn push_raw(&self, text: &str) {
        let _ = self.commands.send(ServerCommand::Event(text.to_string()));
    }

    /// Close the socket from the server side.
    pub fn close_client(&self) {
        let _ = self.commands.send(ServerCommand::Close);
    }

    pub fn authorization(&self) -> Option<String> {
        self.state.authorization.lock().clone()
    }

    pub fn beta_header(&self) -> Option<String> {
        self.state.beta_header.lock().clone()
    }

    pub fn request_uri(&self) -> Option<String> {
        self.state.request_uri.lock().clone()
    }

    pub fn connection_count(&self) -> u32 {
        *self.state.connections.lock()
    }

    pub fn client_closed(&self) -> bool {
        *self.state.client_closed.lock()
    }
}

impl Drop for RealtimeMockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !state.handshake_delay.is_zero() {
        tokio::time::sleep(state.handshake_delay).await;
    }

    let header_state = state.clone();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        *header_state.authorization.lock() = header("authorization");
        *header_state.beta_header.lock() = header("openai-beta");
        *header_state.request_uri.lock() = Some(req.uri().to_string());
        Ok(resp)
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    let (mut write, mut read) = ws_stream.split();

    *state.connections.lock() += 1;

    let mut commands = state.commands.lock().await;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                            let _ = state.received.send(value);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        *state.client_closed.lock() = true;
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        eprintln!("WebSocket error: {}", e);
                        break;
                    }
                }
            }

            command = commands.recv() => {
                match command {
                    Some(ServerCommand::Event(text)) => {
                        write.send(Message::Text(text.into())).await?;
                    }
                    Some(ServerCommand::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
