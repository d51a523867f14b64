use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;
use super::user::User;

/// A 1:1 thread. `last_message` is denormalized for list rendering and
/// `unread_count` is scoped to the signed-in viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub participants: [User; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.participants.iter().any(|p| p.id == user_id)
    }

    /// The participant other than the viewer.
    pub fn peer(&self, viewer_id: Uuid) -> Option<&User> {
        self.participants.iter().find(|p| p.id != viewer_id)
    }

    /// Same thread iff same participant pair, in either order.
    pub fn same_pair(&self, other: &Conversation) -> bool {
        other.participants.iter().all(|p| self.involves(p.id))
    }
}
