//! The messaging client: one shared connection, outbound emits that no-op
//! while disconnected, and the inbound pump feeding the subscriber registry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

use crate::config::{ClientConfig, RejoinPolicy};
use crate::delivery::MessageStatus;
use crate::membership::MembershipLedger;
use crate::presence::TypingEvent;
use crate::protocol::{InboundEvent, OutboundEvent, SocketMessage};
use crate::registry::{SubscriberRegistry, Subscription};
use crate::transport::{Connector, Socket, WebSocketConnector};

/// Why the client last went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called.
    Requested,
    /// The connection attempt failed (`connect_error`).
    ConnectFailed,
    /// The server or network closed an established connection.
    Closed,
}

/// Snapshot of the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connection {
    pub connected: bool,
    pub socket_id: Option<String>,
}

enum Phase {
    Disconnected,
    Connecting,
    Connected {
        outbound: mpsc::UnboundedSender<String>,
        socket_id: Option<String>,
    },
}

struct ConnectionState {
    phase: Phase,
    // Bumped on every connect and disconnect; work from an older generation
    // is stale and must not touch the state.
    generation: u64,
    task: Option<AbortHandle>,
    flushed: Option<oneshot::Receiver<()>>,
    last_disconnect: Option<DisconnectReason>,
}

pub(crate) struct Inner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    pub(crate) registry: SubscriberRegistry,
    state: Mutex<ConnectionState>,
    pub(crate) memberships: Mutex<MembershipLedger>,
}

/// Handle to the messaging connection. Cheap to clone; every clone shares
/// the same connection and subscribers.
#[derive(Clone)]
pub struct MessagingClient {
    pub(crate) inner: Arc<Inner>,
}

impl MessagingClient {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, WebSocketConnector)
    }

    pub fn with_connector<C: Connector>(config: ClientConfig, connector: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                connector: Arc::new(connector),
                registry: SubscriberRegistry::default(),
                state: Mutex::new(ConnectionState {
                    phase: Phase::Disconnected,
                    generation: 0,
                    task: None,
                    flushed: None,
                    last_disconnect: None,
                }),
                memberships: Mutex::new(MembershipLedger::default()),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Starts connecting with `token` and returns immediately. The outcome
    /// arrives on the connection-change channel. Does nothing while a
    /// connection is open or being opened.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn connect(&self, token: &str) {
        let mut state = self.inner.lock_state();
        if !matches!(state.phase, Phase::Disconnected) {
            debug!("connect ignored, connection already open or opening");
            return;
        }

        state.generation += 1;
        state.phase = Phase::Connecting;
        let generation = state.generation;

        info!("Connecting to {}", self.inner.config.endpoint);
        let inner = Arc::clone(&self.inner);
        let token = token.to_owned();
        let handle = tokio::spawn(async move { inner.run(generation, token).await });
        state.task = Some(handle.abort_handle());
    }

    /// Tears the connection down and notifies `false`. Does nothing when
    /// already disconnected.
    pub fn disconnect(&self) {
        let task = {
            let mut state = self.inner.lock_state();
            if matches!(state.phase, Phase::Disconnected) {
                return;
            }
            state.generation += 1;
            state.phase = Phase::Disconnected;
            state.last_disconnect = Some(DisconnectReason::Requested);
            state.task.take()
        };

        if let Some(task) = task {
            task.abort();
        }
        self.inner.lock_memberships().clear();

        info!("Disconnected");
        self.inner.registry.connection.dispatch(&false);
    }

    /// Like [`disconnect`](Self::disconnect), but waits until frames emitted
    /// before the call and the close have been written to the transport.
    /// Use it before shutting the runtime down.
    pub async fn disconnect_and_flush(&self) {
        let flushed = self.inner.lock_state().flushed.take();
        self.disconnect();
        if let Some(flushed) = flushed {
            if flushed.await.is_err() {
                debug!("Transport ended before flushing");
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.inner.lock_state().phase, Phase::Connected { .. })
    }

    pub fn socket_id(&self) -> Option<String> {
        match &self.inner.lock_state().phase {
            Phase::Connected { socket_id, .. } => socket_id.clone(),
            _ => None,
        }
    }

    pub fn connection(&self) -> Connection {
        match &self.inner.lock_state().phase {
            Phase::Connected { socket_id, .. } => Connection {
                connected: true,
                socket_id: socket_id.clone(),
            },
            _ => Connection::default(),
        }
    }

    /// `None` until the first disconnect, and again while connected.
    pub fn last_disconnect(&self) -> Option<DisconnectReason> {
        let state = self.inner.lock_state();
        match state.phase {
            Phase::Disconnected => state.last_disconnect,
            _ => None,
        }
    }

    /// `new_message` and `message_sent` both land here; compare the sender
    /// with the local user (see [`SocketMessage::origin`]) to tell them apart.
    pub fn on_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SocketMessage) + Send + Sync + 'static,
    {
        self.inner.registry.messages.subscribe(callback)
    }

    pub fn on_typing<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TypingEvent) + Send + Sync + 'static,
    {
        self.inner.registry.typing.subscribe(callback)
    }

    pub fn on_message_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&MessageStatus) + Send + Sync + 'static,
    {
        self.inner.registry.statuses.subscribe(callback)
    }

    pub fn on_connection_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.inner.registry.connection.subscribe(callback)
    }

    pub(crate) fn emit(&self, event: OutboundEvent) -> bool {
        self.inner.emit(&event)
    }
}

impl std::fmt::Debug for MessagingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingClient")
            .field("endpoint", &self.inner.config.endpoint)
            .field("connection", &self.connection())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_memberships(&self) -> MutexGuard<'_, MembershipLedger> {
        self.memberships.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn rejoin_policy(&self) -> RejoinPolicy {
        self.config.rejoin
    }

    /// Sends `event` on the live connection. Returns whether it was handed
    /// to the socket; while disconnected the event is dropped.
    fn emit(&self, event: &OutboundEvent) -> bool {
        let outbound = match &self.lock_state().phase {
            Phase::Connected { outbound, .. } => outbound.clone(),
            _ => {
                debug!("Not connected, dropping {}", event.name());
                return false;
            }
        };

        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("{}", e);
                return false;
            }
        };
        if outbound.send(frame).is_err() {
            debug!("Socket already closed, dropping {}", event.name());
            return false;
        }
        true
    }

    async fn run(self: Arc<Self>, generation: u64, token: String) {
        let socket = match self.connector.open(&self.config.endpoint, &token).await {
            Ok(socket) => socket,
            Err(e) => {
                warn!("connect_error: {}", e);
                self.finish(generation, DisconnectReason::ConnectFailed);
                return;
            }
        };
        let Socket {
            outbound,
            mut inbound,
            flushed,
        } = socket;

        {
            let mut state = self.lock_state();
            if state.generation != generation {
                debug!("Discarding connection superseded by disconnect");
                return;
            }
            state.phase = Phase::Connected {
                outbound,
                socket_id: None,
            };
            state.flushed = flushed;
            state.last_disconnect = None;
        }
        info!("Connected to {}", self.config.endpoint);

        self.replay_memberships();
        self.registry.connection.dispatch(&true);

        while let Some(frame) = inbound.recv().await {
            if !self.is_current(generation) {
                return;
            }
            match InboundEvent::decode(&frame) {
                Ok(event) => self.route(generation, event),
                Err(e) => warn!("Dropping inbound frame: {}", e),
            }
        }

        info!("Connection closed by remote");
        self.finish(generation, DisconnectReason::Closed);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_state().generation == generation
    }

    fn route(&self, generation: u64, event: InboundEvent) {
        match event {
            InboundEvent::Connection(info) => {
                let mut state = self.lock_state();
                if state.generation != generation {
                    return;
                }
                if let Phase::Connected { socket_id, .. } = &mut state.phase {
                    debug!("Assigned socket id {}", info.socket_id);
                    *socket_id = Some(info.socket_id);
                }
            }
            InboundEvent::NewMessage(message) | InboundEvent::MessageSent(message) => {
                self.registry.messages.dispatch(&message);
            }
            InboundEvent::UserTyping(indicator) => {
                self.registry.typing.dispatch(&TypingEvent::started(indicator));
            }
            InboundEvent::UserStoppedTyping(indicator) => {
                self.registry.typing.dispatch(&TypingEvent::stopped(indicator));
            }
            InboundEvent::MessagesRead(receipt) => {
                let status = MessageStatus::read_receipt(&receipt, Utc::now());
                self.registry.statuses.dispatch(&status);
            }
        }
    }

    fn replay_memberships(&self) {
        if self.rejoin_policy() != RejoinPolicy::ReplayOnReconnect {
            return;
        }
        let conversations = self.lock_memberships().remembered();
        for conversation_id in conversations {
            debug!("Rejoining {}", conversation_id);
            self.emit(&OutboundEvent::JoinConversation(conversation_id));
        }
    }

    fn finish(&self, generation: u64, reason: DisconnectReason) {
        {
            let mut state = self.lock_state();
            if state.generation != generation || matches!(state.phase, Phase::Disconnected) {
                return;
            }
            state.phase = Phase::Disconnected;
            state.last_disconnect = Some(reason);
            state.task = None;
            state.flushed = None;
        }
        self.registry.connection.dispatch(&false);
    }
}
