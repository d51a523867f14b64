use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::api::{HttpApi, PortalApi};
use crate::config::Config;
use crate::error::AppResult;
use crate::models::{User, UserRole};
use crate::services::conversation_store::ConversationStore;
use crate::services::message_channel::MessageChannel;
use crate::services::notification_feed::NotificationFeed;
use crate::services::presence::PresenceRegistry;
use crate::websocket::{ConnectionManager, Transport, WsTransport};

/// Everything one signed-in session needs, wired over a single channel
/// connection and a single REST client.
pub struct RealtimeClient {
    pub config: Arc<Config>,
    pub api: Arc<dyn PortalApi>,
    pub connection: Arc<ConnectionManager>,
    pub presence: Arc<PresenceRegistry>,
    pub conversations: Arc<ConversationStore>,
    pub notifications: Arc<NotificationFeed>,
    viewer: User,
    session_token: String,
    active_conversation: Arc<RwLock<Option<Uuid>>>,
}

impl RealtimeClient {
    pub fn new(config: Config, viewer: User, session_token: impl Into<String>) -> Self {
        let token = session_token.into();
        let api: Arc<dyn PortalApi> = Arc::new(HttpApi::new(&config.api_base_url, &token));
        let transport: Arc<dyn Transport> = Arc::new(WsTransport::new(&config.channel_url));
        Self::with_parts(config, viewer, token, api, transport)
    }

    /// Construction seam: tests swap the REST and socket layers here.
    pub fn with_parts(
        config: Config,
        viewer: User,
        session_token: String,
        api: Arc<dyn PortalApi>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let config = Arc::new(config);
        let connection = Arc::new(ConnectionManager::new(transport, &config));
        let active_conversation = Arc::new(RwLock::new(None));

        let presence = PresenceRegistry::new();
        presence.attach(&connection);

        let conversations = ConversationStore::new(
            Arc::clone(&api),
            viewer.clone(),
            Arc::clone(&active_conversation),
        );
        conversations.attach(&connection);

        let notifications = NotificationFeed::new(Arc::clone(&api), &config);

        Self {
            config,
            api,
            connection,
            presence,
            conversations,
            notifications,
            viewer,
            session_token,
            active_conversation,
        }
    }

    /// Bring the session online: open the channel and start the feed.
    pub fn connect(&self) {
        self.connection.open(&self.session_token);
        self.notifications.start();
    }

    /// Tear everything down. Dependents are cleared before this returns.
    pub fn disconnect(&self) {
        self.notifications.stop();
        self.connection.close();
    }

    pub fn viewer(&self) -> &User {
        &self.viewer
    }

    pub async fn open_conversation(&self, conversation_id: Uuid) -> AppResult<MessageChannel> {
        MessageChannel::open(
            conversation_id,
            self.viewer.clone(),
            Arc::clone(&self.api),
            Arc::clone(&self.connection),
            Arc::clone(&self.active_conversation),
        )
        .await
    }

    /// Directory search for starting a conversation. Results are filtered
    /// to roles the viewer may message, per the pairing table.
    pub async fn search_contacts(
        &self,
        query: &str,
        role: Option<UserRole>,
    ) -> AppResult<Vec<User>> {
        let users = self.api.search_users(query, role).await?;
        Ok(users
            .into_iter()
            .filter(|u| u.id != self.viewer.id && self.viewer.role.may_message(u.role))
            .collect())
    }

    /// The portal's single unread badge. Conversation unread and
    /// notification unread are disjoint domains (there is no message
    /// notification kind), so summing cannot double-count.
    pub fn unread_badge(&self) -> u64 {
        self.conversations.unread_total() + self.notifications.unread_count()
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
