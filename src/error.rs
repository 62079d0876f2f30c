use thiserror::Error;

/// Failures opening or driving the socket.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("token cannot be sent as a header value")]
    InvalidToken,
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Frames that could not be turned into events, or events that could not be
/// turned into frames.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("frame is not an event envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
    #[error("malformed `{event}` payload: {source}")]
    Malformed {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode `{event}`: {source}")]
    Encode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("endpoint must use ws:// or wss://, got `{0}`")]
    Scheme(String),
}

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
