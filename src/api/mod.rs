pub mod http;

pub use http::HttpApi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Conversation, Message, Notification, User, UserRole};

/// One poll of the notification endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
}

/// The portal's REST surface as consumed by this core. Production traffic
/// goes through [`HttpApi`]; tests substitute their own implementation.
#[async_trait]
pub trait PortalApi: Send + Sync {
    async fn list_conversations(&self) -> AppResult<Vec<Conversation>>;

    /// Prior messages of one conversation, oldest first.
    async fn conversation_messages(&self, conversation_id: Uuid) -> AppResult<Vec<Message>>;

    async fn start_conversation(&self, participant_id: Uuid) -> AppResult<Conversation>;

    /// Durable write of an outgoing message. The returned echo carries the
    /// server-assigned fields plus the caller's correlation identifier.
    async fn post_message(
        &self,
        conversation_id: Uuid,
        content: &str,
        client_message_id: Uuid,
    ) -> AppResult<Message>;

    async fn notifications(&self, limit: usize) -> AppResult<FeedPage>;

    async fn mark_notification_read(&self, id: Uuid) -> AppResult<()>;

    async fn mark_all_notifications_read(&self) -> AppResult<()>;

    async fn delete_notification(&self, id: Uuid) -> AppResult<()>;

    async fn search_users(&self, query: &str, role: Option<UserRole>) -> AppResult<Vec<User>>;
}
