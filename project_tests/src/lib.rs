//! A scripted Cosmic Brain server for end-to-end tests.
//!
//! [`BrainServer::start`] serves `/ws` on an ephemeral localhost port. Every
//! accepted client shows up as a [`ServerSession`] the test drives by hand.

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;

enum Command {
    Text(String),
    Close,
}

/// One accepted client connection.
pub struct ServerSession {
    commands: mpsc::UnboundedSender<Command>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerSession {
    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        self.commands.send(Command::Text(value.to_string())).is_ok()
    }

    /// Closes the socket with a close frame.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Next text frame from the client; `None` on close or timeout.
    pub async fn recv(&mut self, timeout: Duration) -> Option<String> {
        tokio::time::timeout(timeout, self.from_client.recv())
            .await
            .ok()
            .flatten()
    }
}

pub struct BrainServer {
    pub addr: SocketAddr,
    sessions: mpsc::UnboundedReceiver<ServerSession>,
}

impl BrainServer {
    pub async fn start() -> Result<Self> {
        let (accept, sessions) = mpsc::unbounded_channel();
        let app = Router::new().route("/ws", get(ws_handler)).with_state(accept);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("Test server stopped: {}", e);
            }
        });

        Ok(Self { addr, sessions })
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Waits for the next client to connect.
    pub async fn next_session(&mut self, timeout: Duration) -> Option<ServerSession> {
        tokio::time::timeout(timeout, self.sessions.recv())
            .await
            .ok()
            .flatten()
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(accept): State<mpsc::UnboundedSender<ServerSession>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, accept))
}

async fn handle_socket(socket: WebSocket, accept: mpsc::UnboundedSender<ServerSession>) {
    let (commands, mut command_rx) = mpsc::unbounded_channel();
    let (to_test, from_client) = mpsc::unbounded_channel();
    if accept
        .send(ServerSession {
            commands,
            from_client,
        })
        .is_err()
    {
        return;
    }

    let (mut write, mut read) = socket.split();
    loop {
        tokio::select! {
            command = command_rx.recv() => match command {
                Some(Command::Text(text)) => {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = to_test.send(text.to_string());
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    }
}

/// Polls `condition` every 10ms until it holds or `timeout` passes.
pub async fn wait_for<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
