//! Typing indicators and presence status. A relay only: no set of
//! "currently typing" users is kept and nothing is debounced.

use crate::client::MessagingClient;
use crate::protocol::{ConversationRef, OutboundEvent, PresenceStatus, TypingIndicator};

/// What typing subscribers receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingEvent {
    pub indicator: TypingIndicator,
    /// `true` for `user_typing`, `false` for `user_stopped_typing`.
    pub is_typing: bool,
}

impl TypingEvent {
    pub fn started(indicator: TypingIndicator) -> Self {
        Self {
            indicator,
            is_typing: true,
        }
    }

    pub fn stopped(indicator: TypingIndicator) -> Self {
        Self {
            indicator,
            is_typing: false,
        }
    }
}

impl MessagingClient {
    pub fn start_typing(&self, conversation_id: &str) {
        self.emit(OutboundEvent::TypingStart(ConversationRef {
            conversation_id: conversation_id.to_owned(),
        }));
    }

    pub fn stop_typing(&self, conversation_id: &str) {
        self.emit(OutboundEvent::TypingStop(ConversationRef {
            conversation_id: conversation_id.to_owned(),
        }));
    }

    /// Broadcasts the local user's status. Not persisted: after a reconnect
    /// the server knows nothing until this is called again.
    pub fn update_status(&self, status: PresenceStatus) {
        self.emit(OutboundEvent::UpdateStatus(status));
    }
}
