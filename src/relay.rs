//! Fire-and-forget intents: reactions and upload progress. No local state
//! and no acknowledgement; the effect shows up through other updates.

use crate::client::MessagingClient;
use crate::protocol::{OutboundEvent, ReactionIntent, UploadProgress};

impl MessagingClient {
    pub fn add_reaction(&self, message_id: &str, emoji: &str, conversation_id: &str) {
        self.emit(OutboundEvent::AddReaction(reaction(
            message_id,
            emoji,
            conversation_id,
        )));
    }

    pub fn remove_reaction(&self, message_id: &str, emoji: &str, conversation_id: &str) {
        self.emit(OutboundEvent::RemoveReaction(reaction(
            message_id,
            emoji,
            conversation_id,
        )));
    }

    /// `progress` is a percentage, clamped to `0..=100`.
    pub fn report_upload_progress(&self, conversation_id: &str, progress: f64, file_name: &str) {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 100.0)
        };
        self.emit(OutboundEvent::FileUploadProgress(UploadProgress {
            conversation_id: conversation_id.to_owned(),
            progress,
            file_name: file_name.to_owned(),
        }));
    }
}

fn reaction(message_id: &str, emoji: &str, conversation_id: &str) -> ReactionIntent {
    ReactionIntent {
        message_id: message_id.to_owned(),
        emoji: emoji.to_owned(),
        conversation_id: conversation_id.to_owned(),
    }
}
