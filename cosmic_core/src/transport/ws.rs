//! # WebSocket Transport
//!
//! Opens `ws://` / `wss://` sessions with tokio-tungstenite. Each session gets
//! a pump task that forwards outbound text frames to the socket and inbound
//! text (or UTF-8 binary) frames to the session receiver. Control frames are
//! answered by tungstenite itself.

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use super::{Transport, TransportError, TransportSession};

/// WebSocket client transport for one endpoint.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: Url,
}

impl WsTransport {
    /// Validates `endpoint`; only `ws` and `wss` URLs are accepted.
    pub fn new(endpoint: &str) -> Result<Self, TransportError> {
        let url = Url::parse(endpoint)
            .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            other => Err(TransportError::InvalidEndpoint(format!(
                "{}: unsupported scheme '{}'",
                endpoint, other
            ))),
        }
    }

    /// The endpoint this transport connects to.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for WsTransport {
    fn open(&self) -> BoxFuture<'static, Result<TransportSession, TransportError>> {
        let url = self.url.to_string();
        Box::pin(async move {
            let (ws_stream, _) = connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
            log::debug!("WebSocket handshake with {} complete", url);

            let (mut write, mut read) = ws_stream.split();
            let (outbound, mut outgoing) = mpsc::unbounded_channel::<String>();
            let (incoming, inbound) = mpsc::unbounded_channel();

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        frame = outgoing.recv() => match frame {
                            Some(text) => {
                                if let Err(e) = write.send(Message::Text(text.into())).await {
                                    let _ = incoming.send(Err(TransportError::Socket(e.to_string())));
                                    break;
                                }
                            }
                            None => {
                                // Client side closed the session
                                let _ = write.send(Message::Close(None)).await;
                                break;
                            }
                        },
                        msg = read.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                if incoming.send(Ok(text.to_string())).is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(bin))) => match String::from_utf8(bin.to_vec()) {
                                Ok(text) => {
                                    if incoming.send(Ok(text)).is_err() {
                                        break;
                                    }
                                }
                                Err(_) => log::warn!("Dropping non-UTF-8 binary frame ({} bytes)", bin.len()),
                            },
                            Some(Ok(Message::Close(frame))) => {
                                log::info!("WebSocket closed by remote host: {:?}", frame);
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                let _ = incoming.send(Err(TransportError::Socket(e.to_string())));
                                break;
                            }
                            None => {
                                log::warn!("WebSocket stream ended without close frame");
                                break;
                            }
                        }
                    }
                }
            });

            Ok(TransportSession { outbound, inbound })
        })
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_websocket_urls() {
        assert!(WsTransport::new("ws://127.0.0.1:9000/events").is_ok());
        assert!(WsTransport::new("wss://brain.example.org/ws").is_ok());
        assert!(matches!(
            WsTransport::new("https://brain.example.org"),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            WsTransport::new("not a url"),
            Err(TransportError::InvalidEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_to_connect() {
        // Port 9 (discard) is closed on test machines
        let transport = WsTransport::new("ws://127.0.0.1:9/").unwrap();
        assert!(matches!(
            transport.open().await,
            Err(TransportError::ConnectFailed(_))
        ));
    }
}
