use log::debug;

use crate::client::MessagingClient;
use crate::config::RejoinPolicy;
use crate::protocol::OutboundEvent;

/// Conversations to join again after a reconnect, in join order. Only
/// populated under [`RejoinPolicy::ReplayOnReconnect`].
#[derive(Debug, Default)]
pub(crate) struct MembershipLedger {
    joined: Vec<String>,
}

impl MembershipLedger {
    pub(crate) fn record_join(&mut self, conversation_id: &str) {
        if !self.joined.iter().any(|id| id == conversation_id) {
            self.joined.push(conversation_id.to_owned());
        }
    }

    pub(crate) fn record_leave(&mut self, conversation_id: &str) {
        self.joined.retain(|id| id != conversation_id);
    }

    pub(crate) fn clear(&mut self) {
        self.joined.clear();
    }

    pub(crate) fn remembered(&self) -> Vec<String> {
        self.joined.clone()
    }
}

impl MessagingClient {
    /// Asks the server to put this socket in the conversation's room.
    /// Dropped while disconnected; repeated joins are emitted each time.
    pub fn join_conversation(&self, conversation_id: &str) {
        let sent = self.emit(OutboundEvent::JoinConversation(conversation_id.to_owned()));
        if sent && self.inner.rejoin_policy() == RejoinPolicy::ReplayOnReconnect {
            self.inner.lock_memberships().record_join(conversation_id);
        }
    }

    pub fn leave_conversation(&self, conversation_id: &str) {
        self.emit(OutboundEvent::LeaveConversation(conversation_id.to_owned()));
        self.inner.lock_memberships().record_leave(conversation_id);
        debug!("Left {}", conversation_id);
    }

    /// Conversations that will be re-joined on the next reconnect.
    pub fn remembered_conversations(&self) -> Vec<String> {
        self.inner.lock_memberships().remembered()
    }
}
