use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::User;
use crate::websocket::{ChannelEvent, ConnectionManager};

/// Online users as reported by the channel. Entries exist only while the
/// channel is up; with the channel down, "unknown" and "offline" are the
/// same answer and callers must treat it as approximate.
#[derive(Default)]
pub struct PresenceRegistry {
    online: RwLock<HashSet<Uuid>>,
}

impl PresenceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wire the registry to the channel. Snapshot and delta events keep
    /// the set live; the disconnect hook clears it synchronously so a dead
    /// channel can never show stale online entries.
    pub fn attach(self: &Arc<Self>, connection: &ConnectionManager) {
        let registry = Arc::clone(self);
        connection.on_disconnect(move || registry.clear());

        let registry = Arc::clone(self);
        let mut events = connection.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ChannelEvent::PresenceSnapshot(users)) => registry.replace(&users),
                    Ok(ChannelEvent::UserOnline(user_id)) => registry.set_online(user_id),
                    Ok(ChannelEvent::UserOffline(user_id)) => registry.set_offline(user_id),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "presence events lagged, awaiting next snapshot");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.online
            .read()
            .expect("lock poisoned")
            .contains(&user_id)
    }

    pub fn online_users(&self) -> Vec<Uuid> {
        self.online
            .read()
            .expect("lock poisoned")
            .iter()
            .copied()
            .collect()
    }

    pub fn replace(&self, users: &[User]) {
        let mut guard = self.online.write().expect("lock poisoned");
        guard.clear();
        guard.extend(users.iter().map(|u| u.id));
    }

    pub fn set_online(&self, user_id: Uuid) {
        self.online
            .write()
            .expect("lock poisoned")
            .insert(user_id);
    }

    pub fn set_offline(&self, user_id: Uuid) {
        self.online
            .write()
            .expect("lock poisoned")
            .remove(&user_id);
    }

    pub fn clear(&self) {
        self.online.write().expect("lock poisoned").clear();
    }
}
