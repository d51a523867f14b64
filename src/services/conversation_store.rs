use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::PortalApi;
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Message, User};
use crate::websocket::{ChannelEvent, ConnectionManager};

/// The viewer's inbox: most recently touched conversation first, each with
/// a denormalized last message and a viewer-scoped unread count.
pub struct ConversationStore {
    api: Arc<dyn PortalApi>,
    viewer: User,
    conversations: RwLock<Vec<Conversation>>,
    /// Shared with the open MessageChannel; messages for the active thread
    /// never count as unread.
    active: Arc<RwLock<Option<Uuid>>>,
}

impl ConversationStore {
    pub fn new(
        api: Arc<dyn PortalApi>,
        viewer: User,
        active: Arc<RwLock<Option<Uuid>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            api,
            viewer,
            conversations: RwLock::new(Vec::new()),
            active,
        })
    }

    /// Subscribe to the channel: message arrivals bump their thread,
    /// conversation updates upsert the authoritative snapshot. The open
    /// thread consumes the same events separately for its own concern.
    pub fn attach(self: &Arc<Self>, connection: &ConnectionManager) {
        let store = Arc::clone(self);
        let mut events = connection.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ChannelEvent::Message(message)) => store.apply_message(&message),
                    Ok(ChannelEvent::ConversationUpdated(conversation)) => {
                        store.upsert(conversation)
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "conversation events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Replace the list wholesale from the REST source of truth.
    pub async fn load(&self) -> AppResult<()> {
        let conversations = self.api.list_conversations().await?;
        *self.conversations.write().expect("lock poisoned") = conversations;
        Ok(())
    }

    /// Start (or resume) the 1:1 thread with `peer`. Eligibility comes from
    /// the role pairing table; an existing thread with the same pair is
    /// reused so the send path can never fork a duplicate.
    pub async fn start_conversation(&self, peer: &User) -> AppResult<Conversation> {
        if !self.viewer.role.may_message(peer.role) {
            return Err(AppError::Forbidden(format!(
                "{} may not message {}",
                self.viewer.role.as_str(),
                peer.role.as_str()
            )));
        }
        if let Some(existing) = self.find_with(peer.id) {
            return Ok(existing);
        }
        let conversation = self.api.start_conversation(peer.id).await?;
        self.upsert(conversation.clone());
        Ok(conversation)
    }

    pub fn find_with(&self, peer_id: Uuid) -> Option<Conversation> {
        self.conversations
            .read()
            .expect("lock poisoned")
            .iter()
            .find(|c| c.involves(peer_id) && c.involves(self.viewer.id))
            .cloned()
    }

    /// Insert or replace, then move to the front (inbox bump-to-top).
    /// Deduplicates by id and by participant pair.
    pub fn upsert(&self, mut conversation: Conversation) {
        if self.active_id() == Some(conversation.id) {
            // The viewer is looking at this thread; nothing in it is unread.
            conversation.unread_count = 0;
        }
        let mut guard = self.conversations.write().expect("lock poisoned");
        guard.retain(|c| c.id != conversation.id && !c.same_pair(&conversation));
        guard.insert(0, conversation);
    }

    /// Optimistic and local only: the portal has no conversation read
    /// receipt endpoint, so read-state here is best-effort UX.
    pub fn mark_read(&self, conversation_id: Uuid) {
        if let Some(conversation) = self
            .conversations
            .write()
            .expect("lock poisoned")
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            conversation.unread_count = 0;
        }
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations.read().expect("lock poisoned").clone()
    }

    pub fn get(&self, conversation_id: Uuid) -> Option<Conversation> {
        self.conversations
            .read()
            .expect("lock poisoned")
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned()
    }

    pub fn unread_total(&self) -> u64 {
        self.conversations
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|c| u64::from(c.unread_count))
            .sum()
    }

    fn active_id(&self) -> Option<Uuid> {
        *self.active.read().expect("lock poisoned")
    }

    fn apply_message(&self, message: &Message) {
        let active = self.active_id();
        let mut guard = self.conversations.write().expect("lock poisoned");
        let Some(pos) = guard
            .iter()
            .position(|c| c.id == message.conversation_id)
        else {
            debug!(conversation_id = %message.conversation_id, "message for unknown conversation");
            return;
        };
        let mut conversation = guard.remove(pos);
        conversation.last_message = Some(message.clone());
        if message.sender.id != self.viewer.id && active != Some(message.conversation_id) {
            conversation.unread_count += 1;
        }
        guard.insert(0, conversation);
    }
}
