//! In-process transport.
//!
//! Every successful `open()` creates a fresh pair of unbounded channels and
//! sends the server half through the receiver returned by
//! [`ChannelTransport::new`]. Whoever owns that receiver plays the server: it
//! pushes frames, reads what the client sent and ends the session by dropping
//! its [`ServerEnd`] (clean close) or calling [`ServerEnd::fail`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use serde::Serialize;
use tokio::sync::mpsc;

use super::{Transport, TransportError, TransportSession};

/// Server side of one channel session.
pub struct ServerEnd {
    /// Session number, starting at 1.
    pub session: u64,
    to_client: mpsc::UnboundedSender<Result<String, TransportError>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    /// Sends a raw text frame. Returns `false` if the client is gone.
    pub fn push_frame(&self, text: impl Into<String>) -> bool {
        self.to_client.send(Ok(text.into())).is_ok()
    }

    /// Serializes `value` and sends it as a text frame.
    pub fn push_json<T: Serialize>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.push_frame(text),
            Err(e) => {
                log::warn!("Channel session {}: unserializable frame: {}", self.session, e);
                false
            }
        }
    }

    /// Next frame sent by the client, or `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// A frame the client already sent, without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Ends the session with a socket error.
    pub fn fail(self, reason: &str) {
        let _ = self
            .to_client
            .send(Err(TransportError::Socket(reason.to_string())));
    }
}

struct Shared {
    accept: mpsc::UnboundedSender<ServerEnd>,
    refuse: AtomicBool,
    sessions: AtomicU64,
}

/// Transport whose peer lives in the same process.
#[derive(Clone)]
pub struct ChannelTransport {
    shared: Arc<Shared>,
}

impl ChannelTransport {
    /// Creates the transport and the receiver of server ends.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accept, accepted) = mpsc::unbounded_channel();
        let transport = Self {
            shared: Arc::new(Shared {
                accept,
                refuse: AtomicBool::new(false),
                sessions: AtomicU64::new(0),
            }),
        };
        (transport, accepted)
    }

    /// While set, `open()` fails with [`TransportError::ConnectFailed`].
    pub fn set_refuse(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Sessions opened so far.
    pub fn sessions_opened(&self) -> u64 {
        self.shared.sessions.load(Ordering::SeqCst)
    }
}

impl Transport for ChannelTransport {
    fn open(&self) -> BoxFuture<'static, Result<TransportSession, TransportError>> {
        let result = if self.shared.refuse.load(Ordering::SeqCst) {
            Err(TransportError::ConnectFailed("connection refused".into()))
        } else {
            let (to_server, from_client) = mpsc::unbounded_channel();
            let (to_client, inbound) = mpsc::unbounded_channel();
            let session = self.shared.sessions.fetch_add(1, Ordering::SeqCst) + 1;
            let end = ServerEnd {
                session,
                to_client,
                from_client,
            };
            match self.shared.accept.send(end) {
                Ok(()) => Ok(TransportSession {
                    outbound: to_server,
                    inbound,
                }),
                Err(_) => Err(TransportError::ConnectFailed("no server listening".into())),
            }
        };
        Box::pin(future::ready(result))
    }

    fn describe(&self) -> String {
        "channel://in-process".to_string()
    }
}
