//! Socket plumbing. A [`Connector`] opens one authenticated connection and
//! hands back a pair of text-frame channels; everything above it is
//! transport-agnostic.

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, error, info};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::error::TransportError;

/// Live connection as seen by the client: text frames out, text frames in.
///
/// The connection is torn down when `outbound` is dropped. `inbound` closes
/// when the remote side goes away.
pub struct Socket {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
    /// Resolves once every queued frame and the close have been written
    /// after `outbound` was dropped. `None` when there is nothing to flush.
    pub flushed: Option<oneshot::Receiver<()>>,
}

impl Socket {
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            flushed: None,
        }
    }
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, endpoint: &str, token: &str) -> Result<Socket, TransportError>;
}

/// Connects over WebSocket, sending the token as a bearer credential on the
/// upgrade request. `wss://` endpoints use rustls with the ring provider
/// unless the process already installed one.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, endpoint: &str, token: &str) -> Result<Socket, TransportError> {
        let mut request = endpoint
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| TransportError::InvalidToken)?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        if endpoint.starts_with("wss://") {
            // Err only means a provider is already installed.
            let _ = rustls::crypto::ring::default_provider().install_default();
        }

        let (ws_stream, response) = connect_async(request).await?;
        info!(
            "WebSocket handshake with {} completed ({})",
            endpoint,
            response.status()
        );

        let (ws_tx, ws_rx) = ws_stream.split();
        Ok(bridge(ws_tx, ws_rx))
    }
}

/// Pumps text frames between the socket halves and a pair of channels.
///
/// A failed write ends the reader as well, so `inbound` closes and the
/// client sees the connection go away.
fn bridge<W, R>(mut ws_tx: W, mut ws_rx: R) -> Socket
where
    W: Sink<Message, Error = WsError> + Send + Unpin + 'static,
    R: Stream<Item = Result<Message, WsError>> + Send + Unpin + 'static,
{
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
    let (flushed_tx, flushed_rx) = oneshot::channel();

    let reader = tokio::spawn(async move {
        while let Some(result) = ws_rx.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    if inbound_tx.send(text.as_str().to_owned()).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(frame)) => {
                    info!("Server closed the connection: {:?}", frame);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if let Err(e) = ws_tx.send(Message::text(text)).await {
                error!("Failed to send WebSocket message: {}", e);
                reader.abort();
                return;
            }
        }
        debug!("Outbound channel closed, closing socket");
        let _ = ws_tx.send(Message::Close(None)).await;
        let _ = ws_tx.close().await;
        let _ = flushed_tx.send(());
    });

    Socket {
        outbound: outbound_tx,
        inbound: inbound_rx,
        flushed: Some(flushed_rx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn failed_write_closes_inbound() {
        let failing = Box::pin(futures_util::sink::unfold((), |(), _message: Message| async {
            Err::<(), WsError>(WsError::ConnectionClosed)
        }));
        let mut socket = bridge(failing, futures_util::stream::pending());

        socket.outbound.send("frame".to_string()).unwrap();
        let closed = tokio::time::timeout(Duration::from_secs(5), socket.inbound.recv())
            .await
            .expect("reader kept running after the write failed");
        assert_eq!(closed, None);
    }

    #[tokio::test]
    async fn flushed_fires_after_outbound_is_dropped() {
        let (written_tx, mut written) = mpsc::unbounded_channel::<Message>();
        let recording = Box::pin(futures_util::sink::unfold(
            written_tx,
            |written_tx, message: Message| async move {
                let _ = written_tx.send(message);
                Ok::<_, WsError>(written_tx)
            },
        ));
        let socket = bridge(recording, futures_util::stream::pending());

        socket.outbound.send("last".to_string()).unwrap();
        drop(socket.outbound);
        socket.flushed.unwrap().await.unwrap();

        assert_eq!(written.recv().await, Some(Message::text("last".to_string())));
        assert!(matches!(written.recv().await, Some(Message::Close(None))));
    }
}
