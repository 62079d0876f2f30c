//! Wire format spoken with the messaging server.
//!
//! Every frame is a JSON text message shaped `{"event": <name>, "data":
//! <payload>}`. Event names and payload field names are fixed by the server
//! and must not change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRef {
    pub conversation_id: String,
}

/// Presence broadcast by the local user. Global, not per conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Busy,
    Offline,
}

impl std::str::FromStr for PresenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "away" => Ok(Self::Away),
            "busy" => Ok(Self::Busy),
            "offline" => Ok(Self::Offline),
            other => Err(format!("unknown status `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub conversation_id: String,
    pub progress: f64,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionIntent {
    pub message_id: String,
    pub emoji: String,
    pub conversation_id: String,
}

/// Events the client emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    JoinConversation(String),
    LeaveConversation(String),
    TypingStart(ConversationRef),
    TypingStop(ConversationRef),
    UpdateStatus(PresenceStatus),
    FileUploadProgress(UploadProgress),
    AddReaction(ReactionIntent),
    RemoveReaction(ReactionIntent),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinConversation(_) => "join_conversation",
            Self::LeaveConversation(_) => "leave_conversation",
            Self::TypingStart(_) => "typing_start",
            Self::TypingStop(_) => "typing_stop",
            Self::UpdateStatus(_) => "update_status",
            Self::FileUploadProgress(_) => "file_upload_progress",
            Self::AddReaction(_) => "add_reaction",
            Self::RemoveReaction(_) => "remove_reaction",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|source| ProtocolError::Encode {
            event: self.name(),
            source,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, alias = "displayName")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDescriptor {
    pub url: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaDescriptor>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
}

/// A message as pushed by the server. The backend owns it; this is a
/// transient copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketMessage {
    #[serde(rename = "_id", default)]
    pub id: String,
    pub conversation_id: String,
    pub sender: Participant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Participant>,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub conversation_id: String,
}

/// Conversation-wide read receipt. Carries no message id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub conversation_id: String,
    pub read_by: String,
}

/// Server greeting sent right after the upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub socket_id: String,
}

/// Events the server pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    Connection(ConnectionInfo),
    NewMessage(SocketMessage),
    MessageSent(SocketMessage),
    UserTyping(TypingIndicator),
    UserStoppedTyping(TypingIndicator),
    MessagesRead(ReadReceipt),
}

impl InboundEvent {
    pub const NAMES: &'static [&'static str] = &[
        "connection",
        "new_message",
        "message_sent",
        "user_typing",
        "user_stopped_typing",
        "messages_read",
    ];

    /// Decodes one text frame. The envelope is checked first so unknown
    /// events and bad payloads are reported separately.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Envelope)?;
        if !Self::NAMES.contains(&envelope.event.as_str()) {
            return Err(ProtocolError::UnknownEvent(envelope.event));
        }
        serde_json::from_str(text).map_err(|source| ProtocolError::Malformed {
            event: envelope.event,
            source,
        })
    }
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
}
