//! Fan-out of inbound events to independent subscribers.
//!
//! Each channel keeps its callbacks in registration order. Dispatch works on a
//! snapshot of the list, so callbacks may subscribe or unsubscribe while an
//! event is being delivered. An entry deactivated mid-dispatch is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::delivery::MessageStatus;
use crate::presence::TypingEvent;
use crate::protocol::SocketMessage;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback<T>,
}

struct ChannelState<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T: 'static> Detach for Mutex<ChannelState<T>> {
    fn detach(&self, id: u64) {
        let mut state = self.lock().unwrap_or_else(PoisonError::into_inner);
        state.entries.retain(|entry| entry.id != id);
    }
}

/// Handle returned by every `on_*` registration.
///
/// Dropping it leaves the callback registered; call [`unsubscribe`] to
/// remove it.
///
/// [`unsubscribe`]: Subscription::unsubscribe
#[must_use = "keep the handle to be able to unsubscribe"]
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    channel: Weak<dyn Detach>,
}

impl Subscription {
    /// Removes the callback. Safe to call repeatedly and from inside a
    /// callback. Every dispatch that starts after this returns skips the
    /// callback; a dispatch already running on another thread may still
    /// be inside it.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Some(channel) = self.channel.upgrade() {
                channel.detach(self.id);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// One subscription channel.
pub struct Channel<T> {
    state: Arc<Mutex<ChannelState<T>>>,
}

impl<T: 'static> Channel<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChannelState {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let id = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.entries.push(Entry {
                id,
                active: Arc::clone(&active),
                callback: Arc::new(callback),
            });
            id
        };
        let state: Arc<dyn Detach> = self.state.clone();
        Subscription {
            id,
            active,
            channel: Arc::downgrade(&state),
        }
    }

    /// Delivers `event` to every active subscriber in registration order.
    /// The channel lock is not held while callbacks run.
    pub fn dispatch(&self, event: &T) {
        let snapshot: Vec<(Arc<AtomicBool>, Callback<T>)> = self
            .lock()
            .entries
            .iter()
            .map(|entry| (Arc::clone(&entry.active), Arc::clone(&entry.callback)))
            .collect();

        for (active, callback) in snapshot {
            if active.load(Ordering::SeqCst) {
                callback(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The four channels a client fans out to.
#[derive(Default)]
pub struct SubscriberRegistry {
    pub messages: Channel<SocketMessage>,
    pub typing: Channel<TypingEvent>,
    pub statuses: Channel<MessageStatus>,
    pub connection: Channel<bool>,
}
