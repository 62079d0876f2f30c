//! Message delivery and read state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::{ReadReceipt, SocketMessage};

/// Ordered so that a message only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Sent,
    Delivered,
    Read,
}

impl DeliveryState {
    #[must_use]
    pub fn advance(self, observed: Self) -> Self {
        self.max(observed)
    }
}

/// Entry on the message-status channel.
///
/// Read receipts are conversation-wide, so for [`DeliveryState::Read`] the
/// `message_id` field carries the conversation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatus {
    pub message_id: String,
    pub status: DeliveryState,
    pub timestamp: DateTime<Utc>,
}

impl MessageStatus {
    pub fn read_receipt(receipt: &ReadReceipt, received_at: DateTime<Utc>) -> Self {
        Self {
            message_id: receipt.conversation_id.clone(),
            status: DeliveryState::Read,
            timestamp: received_at,
        }
    }
}

/// Who authored a message relative to the local user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    Received,
    /// Confirmation of a message the local user sent.
    Echo,
}

impl SocketMessage {
    pub fn origin(&self, local_user_id: &str) -> MessageOrigin {
        if self.sender.id == local_user_id {
            MessageOrigin::Echo
        } else {
            MessageOrigin::Received
        }
    }

    /// State implied by the flags embedded in the payload. The client does
    /// not reconcile these against status events.
    pub fn delivery_state(&self) -> DeliveryState {
        if self.is_read {
            DeliveryState::Read
        } else if self.is_delivered {
            DeliveryState::Delivered
        } else {
            DeliveryState::Sent
        }
    }
}
