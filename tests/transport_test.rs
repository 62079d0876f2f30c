//! WebSocket transport against a real local server.

use std::time::Duration;

use farmlink_messaging::{
    ClientConfig, Connector, MessagingClient, PresenceStatus, TransportError, WebSocketConnector,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

type Server = (String, oneshot::Receiver<Option<String>>, mpsc::UnboundedReceiver<Message>);

/// Accepts one socket, reports its Authorization header, greets it, then
/// forwards every text and close frame it receives to `frames`.
async fn start_server() -> Server {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (auth_tx, auth_rx) = oneshot::channel();
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |request: &Request, response: Response| {
            let header = request
                .headers()
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let _ = auth_tx.send(header);
            Ok::<Response, ErrorResponse>(response)
        };
        let mut ws = accept_hdr_async(stream, callback).await.unwrap();

        let greeting = json!({"event": "connection", "data": {"socketId": "s-1"}});
        ws.send(Message::text(greeting.to_string())).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(_) => {
                    let _ = frames_tx.send(message);
                }
                Message::Close(_) => {
                    let _ = frames_tx.send(message);
                    break;
                }
                _ => {}
            }
        }
    });

    (format!("ws://{addr}/ws"), auth_rx, frames_rx)
}

fn event(message: Message) -> Value {
    match message {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

async fn within<F: std::future::Future>(future: F) -> F::Output {
    timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

#[tokio::test]
async fn connector_sends_bearer_token_and_relays_frames() {
    let (endpoint, auth, mut frames) = start_server().await;

    let mut socket = WebSocketConnector.open(&endpoint, "abc").await.unwrap();
    assert_eq!(within(auth).await.unwrap(), Some("Bearer abc".to_string()));

    let greeting = within(socket.inbound.recv()).await.unwrap();
    let greeting: Value = serde_json::from_str(&greeting).unwrap();
    assert_eq!(greeting["data"]["socketId"], "s-1");

    socket
        .outbound
        .send(json!({"event": "typing_start", "data": {"conversationId": "c"}}).to_string())
        .unwrap();
    let frame = event(within(frames.recv()).await.unwrap());
    assert_eq!(frame["event"], "typing_start");

    drop(socket.outbound);
    assert_eq!(within(socket.inbound.recv()).await, None);
}

#[tokio::test]
async fn client_runs_over_websocket() {
    let (endpoint, _auth, mut frames) = start_server().await;
    let client = MessagingClient::new(ClientConfig::with_endpoint(endpoint));

    let (tx, mut changes) = mpsc::unbounded_channel();
    let _sub = client.on_connection_change(move |connected| {
        let _ = tx.send(*connected);
    });
    client.connect("abc");
    assert_eq!(within(changes.recv()).await, Some(true));

    client.join_conversation("conv-1");
    let frame = event(within(frames.recv()).await.unwrap());
    assert_eq!(frame, json!({"event": "join_conversation", "data": "conv-1"}));

    client.disconnect();
    assert_eq!(within(changes.recv()).await, Some(false));
}

#[tokio::test]
async fn disconnect_and_flush_writes_pending_frames_then_closes() {
    let (endpoint, _auth, mut frames) = start_server().await;
    let client = MessagingClient::new(ClientConfig::with_endpoint(endpoint));

    let (tx, mut changes) = mpsc::unbounded_channel();
    let _sub = client.on_connection_change(move |connected| {
        let _ = tx.send(*connected);
    });
    client.connect("abc");
    assert_eq!(within(changes.recv()).await, Some(true));

    client.update_status(PresenceStatus::Offline);
    within(client.disconnect_and_flush()).await;
    assert!(!client.is_connected());
    assert_eq!(within(changes.recv()).await, Some(false));

    let frame = event(within(frames.recv()).await.unwrap());
    assert_eq!(frame, json!({"event": "update_status", "data": "offline"}));
    assert!(matches!(within(frames.recv()).await, Some(Message::Close(_))));
}

#[tokio::test]
async fn refused_connection_is_a_handshake_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = WebSocketConnector.open(&format!("ws://{addr}/ws"), "abc").await;
    assert!(matches!(result, Err(TransportError::Handshake(_))));
}

#[tokio::test]
async fn bad_endpoint_and_token_are_rejected_before_dialing() {
    let result = WebSocketConnector.open("not a url", "abc").await;
    assert!(matches!(result, Err(TransportError::InvalidEndpoint { .. })));

    let result = WebSocketConnector
        .open("ws://127.0.0.1:1/ws", "line\nbreak")
        .await;
    assert!(matches!(result, Err(TransportError::InvalidToken)));
}
