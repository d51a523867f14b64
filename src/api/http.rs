use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Message, Notification, User, UserRole};

use super::{FeedPage, PortalApi};

/// Bearer-token REST client for the portal backend.
pub struct HttpApi {
    http: Client,
    base_url: String,
    token: String,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(resp: Response, context: &str) -> AppResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        Err(AppError::from_status(status.as_u16(), context))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let resp = Self::check(resp, path).await?;
        resp.json::<T>()
            .await
            .map_err(|e| AppError::DataShape(format!("{path}: {e}")))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartConversationBody {
    participant_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostMessageBody<'a> {
    conversation_id: Uuid,
    content: &'a str,
    client_message_id: Uuid,
    #[serde(rename = "type")]
    kind: &'a str,
}

#[async_trait]
impl PortalApi for HttpApi {
    async fn list_conversations(&self) -> AppResult<Vec<Conversation>> {
        self.get_json("/chat/conversations").await
    }

    async fn conversation_messages(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        self.get_json(&format!("/chat/conversations/{conversation_id}/messages"))
            .await
    }

    async fn start_conversation(&self, participant_id: Uuid) -> AppResult<Conversation> {
        let resp = self
            .http
            .post(self.url("/chat/conversations"))
            .bearer_auth(&self.token)
            .json(&StartConversationBody { participant_id })
            .send()
            .await?;
        let resp = Self::check(resp, "start conversation").await?;
        resp.json()
            .await
            .map_err(|e| AppError::DataShape(format!("start conversation: {e}")))
    }

    async fn post_message(
        &self,
        conversation_id: Uuid,
        content: &str,
        client_message_id: Uuid,
    ) -> AppResult<Message> {
        let resp = self
            .http
            .post(self.url("/chat/messages"))
            .bearer_auth(&self.token)
            .json(&PostMessageBody {
                conversation_id,
                content,
                client_message_id,
                kind: "text",
            })
            .send()
            .await?;
        let resp = Self::check(resp, "post message").await?;
        resp.json()
            .await
            .map_err(|e| AppError::DataShape(format!("post message: {e}")))
    }

    async fn notifications(&self, limit: usize) -> AppResult<FeedPage> {
        let path = format!("/notifications?limit={limit}");
        let resp = self
            .http
            .get(self.url(&path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            // No notifications yet; not an error worth surfacing.
            return Ok(FeedPage::default());
        }
        let resp = Self::check(resp, "notifications").await?;
        let value = resp
            .json::<Value>()
            .await
            .map_err(|e| AppError::DataShape(format!("notifications: {e}")))?;
        Ok(parse_feed_page(value))
    }

    async fn mark_notification_read(&self, id: Uuid) -> AppResult<()> {
        let resp = self
            .http
            .put(self.url(&format!("/notifications/{id}/read")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(resp, "mark notification read").await?;
        Ok(())
    }

    async fn mark_all_notifications_read(&self) -> AppResult<()> {
        let resp = self
            .http
            .put(self.url("/notifications/mark-all-read"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(resp, "mark all read").await?;
        Ok(())
    }

    async fn delete_notification(&self, id: Uuid) -> AppResult<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/notifications/{id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(resp, "delete notification").await?;
        Ok(())
    }

    async fn search_users(&self, query: &str, role: Option<UserRole>) -> AppResult<Vec<User>> {
        let mut req = self
            .http
            .get(self.url("/users/search"))
            .bearer_auth(&self.token)
            .query(&[("query", query)]);
        if let Some(role) = role {
            req = req.query(&[("role", role.as_str())]);
        }
        let resp = req.send().await?;
        let resp = Self::check(resp, "search users").await?;
        resp.json()
            .await
            .map_err(|e| AppError::DataShape(format!("search users: {e}")))
    }
}

/// Extract a feed page from whatever the endpoint returned. Malformed or
/// non-array payloads degrade to an empty page; individual bad entries are
/// skipped. The feed must keep polling no matter what came back.
pub(crate) fn parse_feed_page(value: Value) -> FeedPage {
    let notifications = match value.get("notifications") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match serde_json::from_value::<Notification>(item.clone()) {
                Ok(notification) => Some(notification),
                Err(err) => {
                    warn!(error = %err, "skipping malformed notification entry");
                    None
                }
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            warn!(got = %other, "notification payload is not an array");
            Vec::new()
        }
    };
    let unread_count = value
        .get("unreadCount")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    FeedPage {
        notifications,
        unread_count,
    }
}
