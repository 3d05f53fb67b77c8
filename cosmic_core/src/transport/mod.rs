//! # Transport Module
//!
//! The seam between the connection manager and the actual socket. A transport
//! only knows how to open one session; reconnection, statistics and event
//! parsing live in the connection manager.
//!
//! ## Contained Modules:
//!
//! - **`channel`**: An in-process transport backed by tokio channels. Each
//!   `open()` hands the peer side to whoever holds the receiver, which lets
//!   tests play the server.
//! - **`ws`**: (feature `websocket`) A tokio-tungstenite client for live
//!   `ws://` and `wss://` endpoints.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;

/// In-process transport.
pub mod channel;
#[cfg(feature = "websocket")]
/// WebSocket transport.
pub mod ws;

pub use channel::{ChannelTransport, ServerEnd};
#[cfg(feature = "websocket")]
pub use ws::WsTransport;

/// Socket-level failures. Always non-fatal for the core; they drive the
/// reconnection state machine.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("connection failed: {0}")]
    ConnectFailed(String),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("connection closed")]
    Closed,
}

/// One open session.
///
/// Dropping `outbound` asks the transport to close the session. The session
/// has ended once `inbound` yields `None` (clean close) or an `Err` (failure).
pub struct TransportSession {
    /// Text frames to send.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Text frames received, in arrival order.
    pub inbound: mpsc::UnboundedReceiver<Result<String, TransportError>>,
}

/// Something that can open sessions to one endpoint.
pub trait Transport: Send + Sync + 'static {
    /// Opens a new session.
    fn open(&self) -> BoxFuture<'static, Result<TransportSession, TransportError>>;

    /// Endpoint description for log lines.
    fn describe(&self) -> String;
}
