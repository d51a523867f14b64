//! Wire events for the portal's realtime channel.
//!
//! Every frame is a JSON text message of the shape
//! `{"event": "<name>", "data": {...}}`. Event names mirror the server
//! contract: `joinConversation` and `sendMessage` go up; `receiveMessage`,
//! `onlineUsers`, `userOnline`, `userOffline` and `conversationUpdate`
//! come down. Unknown frames are dropped by the transport, not errors.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Conversation, Message, User};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinConversation { conversation_id: Uuid },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        conversation_id: Uuid,
        content: String,
        client_message_id: Uuid,
    },
}

impl ClientEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::JoinConversation { .. } => "joinConversation",
            Self::SendMessage { .. } => "sendMessage",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    ReceiveMessage(Message),
    /// Full presence snapshot, pushed right after connect.
    OnlineUsers(Vec<User>),
    #[serde(rename_all = "camelCase")]
    UserOnline { user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    UserOffline { user_id: Uuid },
    ConversationUpdate(Conversation),
}

impl ServerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ReceiveMessage(_) => "receiveMessage",
            Self::OnlineUsers(_) => "onlineUsers",
            Self::UserOnline { .. } => "userOnline",
            Self::UserOffline { .. } => "userOffline",
            Self::ConversationUpdate(_) => "conversationUpdate",
        }
    }
}
