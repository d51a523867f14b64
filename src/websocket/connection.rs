//! Lifecycle of the single realtime channel shared by one session.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{Conversation, Message, User};

use super::events::{ClientEvent, ServerEvent};
use super::transport::{EventChannel, EventSink, EventStream, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// What dependents see on their broadcast subscription.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Channel is up and desired rooms have been rejoined.
    Connected,
    Message(Message),
    PresenceSnapshot(Vec<User>),
    UserOnline(Uuid),
    UserOffline(Uuid),
    ConversationUpdated(Conversation),
    /// Channel dropped; a reconnect attempt follows.
    Disconnected,
    /// Reconnect attempts exhausted. Emitted once per exhaustion.
    Failed,
}

type DisconnectHook = Box<dyn Fn() + Send + Sync>;

/// Owns the one channel connection per session. Everything else observes
/// it through `subscribe`/`status` and never opens or closes it directly.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    max_attempts: u32,
    base_delay: Duration,
    status_tx: watch::Sender<ChannelStatus>,
    events_tx: broadcast::Sender<ChannelEvent>,
    rooms: Arc<Mutex<HashSet<Uuid>>>,
    hooks: Arc<Mutex<Vec<DisconnectHook>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientEvent>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, config: &Config) -> Self {
        let (status_tx, _) = watch::channel(ChannelStatus::Disconnected);
        let (events_tx, _) = broadcast::channel(256);
        Self {
            transport,
            max_attempts: config.reconnect_max_attempts,
            base_delay: config.reconnect_delay,
            status_tx,
            events_tx,
            rooms: Arc::new(Mutex::new(HashSet::new())),
            hooks: Arc::new(Mutex::new(Vec::new())),
            outbound: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Establish the channel. No-op while a connection attempt or a live
    /// channel already exists for this session.
    pub fn open(&self, session_token: &str) {
        let mut task = self.task.lock().expect("lock poisoned");
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                debug!("channel already open, ignoring open()");
                return;
            }
        }
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        *self.outbound.lock().expect("lock poisoned") = Some(out_tx);
        let worker = Worker {
            transport: Arc::clone(&self.transport),
            token: session_token.to_string(),
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            status_tx: self.status_tx.clone(),
            events_tx: self.events_tx.clone(),
            rooms: Arc::clone(&self.rooms),
            hooks: Arc::clone(&self.hooks),
        };
        *task = Some(tokio::spawn(worker.run(out_rx)));
    }

    /// Tear the channel down. Dependents are signalled synchronously via
    /// the disconnect hooks before resources are released. Idempotent.
    pub fn close(&self) {
        let handle = self.task.lock().expect("lock poisoned").take();
        self.outbound.lock().expect("lock poisoned").take();
        let Some(handle) = handle else { return };
        handle.abort();
        run_hooks(&self.hooks);
        self.status_tx.send_replace(ChannelStatus::Disconnected);
        let _ = self.events_tx.send(ChannelEvent::Disconnected);
    }

    /// Join the conversation room now and after every future (re)connect.
    pub fn join(&self, conversation_id: Uuid) {
        self.rooms
            .lock()
            .expect("lock poisoned")
            .insert(conversation_id);
        // Best-effort immediate join; replay covers the offline case.
        self.try_send(ClientEvent::JoinConversation { conversation_id });
    }

    pub fn leave(&self, conversation_id: Uuid) {
        self.rooms
            .lock()
            .expect("lock poisoned")
            .remove(&conversation_id);
    }

    /// Best-effort emit; silently dropped when no channel task is alive.
    pub fn try_send(&self, event: ClientEvent) {
        if let Some(tx) = self.outbound.lock().expect("lock poisoned").as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events_tx.subscribe()
    }

    pub fn status(&self) -> watch::Receiver<ChannelStatus> {
        self.status_tx.subscribe()
    }

    pub fn current_status(&self) -> ChannelStatus {
        *self.status_tx.borrow()
    }

    /// Register a hook run synchronously on every disconnect (drop,
    /// exhaustion, close) before dependents can observe the dead channel.
    pub fn on_disconnect(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks.lock().expect("lock poisoned").push(Box::new(hook));
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_hooks(hooks: &Mutex<Vec<DisconnectHook>>) {
    for hook in hooks.lock().expect("lock poisoned").iter() {
        hook();
    }
}

struct Worker {
    transport: Arc<dyn Transport>,
    token: String,
    max_attempts: u32,
    base_delay: Duration,
    status_tx: watch::Sender<ChannelStatus>,
    events_tx: broadcast::Sender<ChannelEvent>,
    rooms: Arc<Mutex<HashSet<Uuid>>>,
    hooks: Arc<Mutex<Vec<DisconnectHook>>>,
}

impl Worker {
    async fn run(self, mut outbound: mpsc::UnboundedReceiver<ClientEvent>) {
        loop {
            self.status_tx.send_replace(ChannelStatus::Connecting);
            let Some(channel) = self.connect_with_retry().await else {
                // Retry budget spent: park disconnected, tell dependents once.
                self.status_tx.send_replace(ChannelStatus::Disconnected);
                run_hooks(&self.hooks);
                let _ = self.events_tx.send(ChannelEvent::Failed);
                return;
            };
            let EventChannel {
                mut sink,
                mut stream,
            } = channel;
            self.status_tx.send_replace(ChannelStatus::Connected);

            // Desired subscriptions survive the socket; replay them before
            // announcing the channel as usable.
            if self.replay_rooms(sink.as_mut()).await.is_err() {
                warn!("room replay failed, reconnecting");
                run_hooks(&self.hooks);
                let _ = self.events_tx.send(ChannelEvent::Disconnected);
                continue;
            }
            let _ = self.events_tx.send(ChannelEvent::Connected);

            let reconnect = self
                .pump(sink.as_mut(), stream.as_mut(), &mut outbound)
                .await;

            // Derived state (presence, open threads) must be cleared before
            // anyone can treat the dead channel as live.
            run_hooks(&self.hooks);
            let _ = self.events_tx.send(ChannelEvent::Disconnected);
            if !reconnect {
                self.status_tx.send_replace(ChannelStatus::Disconnected);
                return;
            }
        }
    }

    async fn connect_with_retry(&self) -> Option<EventChannel> {
        for attempt in 1..=self.max_attempts {
            match self.transport.connect(&self.token).await {
                Ok(channel) => {
                    info!(attempt, "channel connected");
                    return Some(channel);
                }
                Err(err) => {
                    // Not user-visible until the whole budget is spent.
                    warn!(attempt, error = %err, "channel connect failed");
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.base_delay * attempt).await;
                    }
                }
            }
        }
        None
    }

    async fn replay_rooms(&self, sink: &mut dyn EventSink) -> Result<(), crate::error::AppError> {
        let rooms: Vec<Uuid> = self
            .rooms
            .lock()
            .expect("lock poisoned")
            .iter()
            .copied()
            .collect();
        for conversation_id in rooms {
            sink.send(ClientEvent::JoinConversation { conversation_id })
                .await?;
        }
        Ok(())
    }

    /// Multiplex outgoing commands and inbound frames. Returns true when
    /// the socket dropped (reconnect), false when the manager shut down.
    async fn pump(
        &self,
        sink: &mut dyn EventSink,
        stream: &mut dyn EventStream,
        outbound: &mut mpsc::UnboundedReceiver<ClientEvent>,
    ) -> bool {
        loop {
            tokio::select! {
                command = outbound.recv() => match command {
                    Some(event) => {
                        if let Err(err) = sink.send(event).await {
                            warn!(error = %err, "channel send failed");
                            return true;
                        }
                    }
                    None => return false,
                },
                inbound = stream.next_event() => match inbound {
                    Some(Ok(event)) => self.dispatch(event),
                    Some(Err(err)) => {
                        warn!(error = %err, "channel read failed");
                        return true;
                    }
                    None => {
                        info!("channel closed by server");
                        return true;
                    }
                },
            }
        }
    }

    fn dispatch(&self, event: ServerEvent) {
        let mapped = match event {
            ServerEvent::ReceiveMessage(message) => ChannelEvent::Message(message),
            ServerEvent::OnlineUsers(users) => ChannelEvent::PresenceSnapshot(users),
            ServerEvent::UserOnline { user_id } => ChannelEvent::UserOnline(user_id),
            ServerEvent::UserOffline { user_id } => ChannelEvent::UserOffline(user_id),
            ServerEvent::ConversationUpdate(conversation) => {
                ChannelEvent::ConversationUpdated(conversation)
            }
        };
        let _ = self.events_tx.send(mapped);
    }
}
