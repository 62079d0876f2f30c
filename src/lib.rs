//! Real-time conversation client for the FarmLink marketplace.
//!
//! A [`MessagingClient`] owns one authenticated socket to the messaging
//! server. UI code registers callbacks on four channels (messages, typing,
//! message status, connection changes), connects with a token, and calls
//! outbound operations (join/leave, typing, status, reactions) which are
//! silently dropped while disconnected.
//!
//! ```no_run
//! use farmlink_messaging::{ClientConfig, MessagingClient};
//!
//! # async fn run() {
//! let client = MessagingClient::new(ClientConfig::default());
//! let joiner = client.clone();
//! let _sub = client.on_connection_change(move |connected| {
//!     if *connected {
//!         joiner.join_conversation("conv-1");
//!     }
//! });
//! client.connect("token");
//! # }
//! ```

pub mod client;
pub mod config;
pub mod delivery;
pub mod error;
pub mod membership;
pub mod presence;
pub mod protocol;
pub mod reconnect;
pub mod registry;
pub mod relay;
pub mod transport;

pub use client::{Connection, DisconnectReason, MessagingClient};
pub use config::{ClientConfig, RejoinPolicy};
pub use delivery::{DeliveryState, MessageOrigin, MessageStatus};
pub use error::{ConfigError, MessagingError, ProtocolError, TransportError};
pub use presence::TypingEvent;
pub use protocol::{
    InboundEvent, MessageContent, MessageKind, OutboundEvent, Participant, PresenceStatus,
    ReadReceipt, SocketMessage, TypingIndicator,
};
pub use reconnect::{ReconnectPolicy, ReconnectSupervisor};
pub use registry::Subscription;
pub use transport::{Connector, Socket, WebSocketConnector};
