use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::User;

/// Client-side delivery state. Anything sourced from the server is `Sent`;
/// `Pending` and `Failed` only ever describe the viewer's own optimistic
/// entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    #[default]
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: User,
    pub content: String,
    /// Correlation identifier: generated by the sending client, echoed back
    /// by the server on both delivery paths so the echo can replace the
    /// optimistic entry instead of duplicating it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(skip)]
    pub status: DeliveryStatus,
}

impl Message {
    pub fn correlation_id(&self) -> Uuid {
        self.client_message_id.unwrap_or(self.id)
    }

    /// Total order within a conversation: timestamp first, identifier as
    /// the tie-break.
    pub fn sort_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.id)
    }

    pub fn local_date(&self) -> NaiveDate {
        self.created_at.with_timezone(&Local).date_naive()
    }
}

pub fn sort_messages(messages: &mut [Message]) {
    messages.sort_by_key(Message::sort_key);
}

#[derive(Debug, Clone)]
pub struct DateGroup {
    pub date: NaiveDate,
    pub messages: Vec<Message>,
}

/// Split an already-sorted list into calendar-date groups in the viewer's
/// local zone. A message opens a new group whenever its date differs from
/// the preceding message's.
pub fn group_by_date(messages: &[Message]) -> Vec<DateGroup> {
    let mut groups: Vec<DateGroup> = Vec::new();
    for message in messages {
        let date = message.local_date();
        match groups.last_mut() {
            Some(group) if group.date == date => group.messages.push(message.clone()),
            _ => groups.push(DateGroup {
                date,
                messages: vec![message.clone()],
            }),
        }
    }
    groups
}
