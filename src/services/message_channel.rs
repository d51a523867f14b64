use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

use crate::api::PortalApi;
use crate::error::{AppError, AppResult};
use crate::models::message::{group_by_date, sort_messages, DateGroup, DeliveryStatus, Message};
use crate::models::User;
use crate::websocket::{ChannelEvent, ClientEvent, ConnectionManager};

/// The open thread. One of these exists per conversation the viewer is
/// currently looking at; closing it releases the room subscription, the
/// event listener and the active-conversation marker.
pub struct MessageChannel {
    conversation_id: Uuid,
    viewer: User,
    api: Arc<dyn PortalApi>,
    connection: Arc<ConnectionManager>,
    messages: Arc<RwLock<Vec<Message>>>,
    active: Arc<RwLock<Option<Uuid>>>,
    closed: Arc<AtomicBool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl MessageChannel {
    /// Join the room and subscribe, then seed from history. Subscription
    /// is registered before the fetch so an echo arriving mid-fetch cannot
    /// be lost; the merge step absorbs any overlap.
    pub async fn open(
        conversation_id: Uuid,
        viewer: User,
        api: Arc<dyn PortalApi>,
        connection: Arc<ConnectionManager>,
        active: Arc<RwLock<Option<Uuid>>>,
    ) -> AppResult<Self> {
        *active.write().expect("lock poisoned") = Some(conversation_id);
        connection.join(conversation_id);

        let messages = Arc::new(RwLock::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let mut events = connection.subscribe();
        let listener = {
            let messages = Arc::clone(&messages);
            let closed = Arc::clone(&closed);
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(ChannelEvent::Message(message))
                            if message.conversation_id == conversation_id =>
                        {
                            if closed.load(Ordering::SeqCst) {
                                break;
                            }
                            let mut guard = messages.write().expect("lock poisoned");
                            merge_message(&mut guard, message);
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "thread events lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        };

        let channel = Self {
            conversation_id,
            viewer,
            api,
            connection,
            messages,
            active,
            closed,
            listener: Mutex::new(Some(listener)),
        };

        let history = channel
            .api
            .conversation_messages(conversation_id)
            .await?;
        {
            let mut guard = channel.messages.write().expect("lock poisoned");
            for message in history {
                merge_message(&mut guard, message);
            }
        }
        Ok(channel)
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Dual-path send. The optimistic entry appears immediately under a
    /// client-generated correlation identifier; the channel emit races the
    /// durable REST write and whichever echo lands first replaces it.
    /// Returns the correlation identifier.
    pub async fn send(&self, text: &str) -> AppResult<Uuid> {
        let client_message_id = Uuid::new_v4();
        let local = Message {
            id: client_message_id,
            conversation_id: self.conversation_id,
            sender: self.viewer.clone(),
            content: text.to_string(),
            client_message_id: Some(client_message_id),
            created_at: Utc::now(),
            read: false,
            status: DeliveryStatus::Pending,
        };
        {
            let mut guard = self.messages.write().expect("lock poisoned");
            merge_message(&mut guard, local);
        }
        self.deliver(client_message_id, text).await?;
        Ok(client_message_id)
    }

    /// Re-run the dual path for a failed entry, once per invocation, under
    /// the same correlation identifier.
    pub async fn retry(&self, client_message_id: Uuid) -> AppResult<()> {
        let content = {
            let guard = self.messages.read().expect("lock poisoned");
            let Some(message) = guard.iter().find(|m| {
                m.correlation_id() == client_message_id && m.status == DeliveryStatus::Failed
            }) else {
                return Err(AppError::Persistence("no failed message to retry".into()));
            };
            message.content.clone()
        };
        self.set_status(client_message_id, DeliveryStatus::Pending);
        self.deliver(client_message_id, &content).await
    }

    async fn deliver(&self, client_message_id: Uuid, content: &str) -> AppResult<()> {
        // Low-latency path: best-effort, never retried on its own.
        self.connection.try_send(ClientEvent::SendMessage {
            conversation_id: self.conversation_id,
            content: content.to_string(),
            client_message_id,
        });
        // Durable path: decides sent vs failed.
        match self
            .api
            .post_message(self.conversation_id, content, client_message_id)
            .await
        {
            Ok(echo) => {
                // A close while the POST was in flight means this view no
                // longer exists; its state must not be resurrected.
                if !self.closed.load(Ordering::SeqCst) {
                    let mut guard = self.messages.write().expect("lock poisoned");
                    merge_message(&mut guard, echo);
                }
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, %client_message_id, "message persist failed");
                self.set_status(client_message_id, DeliveryStatus::Failed);
                Err(err)
            }
        }
    }

    fn set_status(&self, correlation_id: Uuid, status: DeliveryStatus) {
        if let Some(message) = self
            .messages
            .write()
            .expect("lock poisoned")
            .iter_mut()
            .find(|m| m.correlation_id() == correlation_id)
        {
            message.status = status;
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.read().expect("lock poisoned").clone()
    }

    /// Calendar groups for display, viewer-local dates.
    pub fn date_groups(&self) -> Vec<DateGroup> {
        group_by_date(&self.messages.read().expect("lock poisoned"))
    }

    /// Leave the room and drop the listener. Idempotent. Late REST echoes
    /// for this view are ignored from this point on.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut active = self.active.write().expect("lock poisoned");
            if *active == Some(self.conversation_id) {
                *active = None;
            }
        }
        self.connection.leave(self.conversation_id);
        if let Some(listener) = self.listener.lock().expect("lock poisoned").take() {
            listener.abort();
        }
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Merge one incoming message into a thread. An entry sharing the
/// correlation identifier is replaced in place (the authoritative copy
/// wins and delivery becomes `sent`); anything else is appended. The list
/// is then re-sorted into the conversation's total order, which is the
/// only ordering guarantee regardless of which path delivered first.
pub(crate) fn merge_message(list: &mut Vec<Message>, incoming: Message) {
    match list
        .iter_mut()
        .find(|m| m.correlation_id() == incoming.correlation_id())
    {
        Some(existing) => *existing = incoming,
        None => list.push(incoming),
    }
    sort_messages(list);
}
