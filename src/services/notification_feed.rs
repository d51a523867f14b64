use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::warn;
use uuid::Uuid;

use crate::api::{FeedPage, PortalApi};
use crate::config::Config;
use crate::error::AppError;

/// Polling notification feed. The server is authoritative at each tick;
/// between ticks, read-state mutations are optimistic and any REST failure
/// leaves the optimistic state in place and surfaces on the error channel.
pub struct NotificationFeed {
    api: Arc<dyn PortalApi>,
    poll_interval: Duration,
    limit: usize,
    state: Arc<RwLock<FeedPage>>,
    errors_tx: broadcast::Sender<AppError>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationFeed {
    pub fn new(api: Arc<dyn PortalApi>, config: &Config) -> Arc<Self> {
        let (errors_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            api,
            poll_interval: config.poll_interval,
            limit: config.notification_limit,
            state: Arc::new(RwLock::new(FeedPage::default())),
            errors_tx,
            poller: Mutex::new(None),
        })
    }

    /// Begin polling; the first tick fires immediately. No-op while a
    /// poller is already running.
    pub fn start(&self) {
        let mut poller = self.poller.lock().expect("lock poisoned");
        if poller.as_ref().is_some_and(|p| !p.is_finished()) {
            return;
        }
        let api = Arc::clone(&self.api);
        let state = Arc::clone(&self.state);
        let errors_tx = self.errors_tx.clone();
        let limit = self.limit;
        let every = self.poll_interval;
        *poller = Some(tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match api.notifications(limit).await {
                    Ok(page) => {
                        *state.write().expect("lock poisoned") = page;
                    }
                    Err(err) => {
                        // Keep the last known page and keep polling.
                        warn!(error = %err, "notification poll failed");
                        let _ = errors_tx.send(err);
                    }
                }
            }
        }));
    }

    /// Cancel polling. Required on teardown; also runs on Drop so a
    /// forgotten feed cannot leak its timer.
    pub fn stop(&self) {
        if let Some(poller) = self.poller.lock().expect("lock poisoned").take() {
            poller.abort();
        }
    }

    pub fn page(&self) -> FeedPage {
        self.state.read().expect("lock poisoned").clone()
    }

    pub fn unread_count(&self) -> u64 {
        self.state.read().expect("lock poisoned").unread_count
    }

    /// Failures of the optimistic mutations and of the poller itself land
    /// here, for the toast affordance.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<AppError> {
        self.errors_tx.subscribe()
    }

    pub async fn mark_read(&self, id: Uuid) {
        {
            let mut guard = self.state.write().expect("lock poisoned");
            let state = &mut *guard;
            if let Some(notification) = state.notifications.iter_mut().find(|n| n.id == id) {
                if !notification.read {
                    notification.read = true;
                    state.unread_count = state.unread_count.saturating_sub(1);
                }
            }
        }
        if let Err(err) = self.api.mark_notification_read(id).await {
            // Optimistic state stays; the next successful poll reconciles.
            warn!(%id, error = %err, "mark notification read failed");
            let _ = self.errors_tx.send(err);
        }
    }

    pub async fn mark_all_read(&self) {
        {
            let mut guard = self.state.write().expect("lock poisoned");
            let state = &mut *guard;
            for notification in &mut state.notifications {
                notification.read = true;
            }
            state.unread_count = 0;
        }
        if let Err(err) = self.api.mark_all_notifications_read().await {
            warn!(error = %err, "mark all read failed");
            let _ = self.errors_tx.send(err);
        }
    }

    pub async fn delete(&self, id: Uuid) {
        {
            let mut guard = self.state.write().expect("lock poisoned");
            let state = &mut *guard;
            if let Some(pos) = state.notifications.iter().position(|n| n.id == id) {
                let removed = state.notifications.remove(pos);
                if !removed.read {
                    state.unread_count = state.unread_count.saturating_sub(1);
                }
            }
        }
        if let Err(err) = self.api.delete_notification(id).await {
            warn!(%id, error = %err, "delete notification failed");
            let _ = self.errors_tx.send(err);
        }
    }
}

impl Drop for NotificationFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use crate::models::{
        Conversation, Message, Notification, NotificationKind, Priority, User, UserRole,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlakyApi {
        page: Mutex<FeedPage>,
        fail_mutations: AtomicBool,
    }

    impl FlakyApi {
        fn with_unread(count: usize) -> Arc<Self> {
            let notifications = (0..count)
                .map(|i| Notification {
                    id: Uuid::from_u128(i as u128 + 1),
                    recipient_id: Uuid::from_u128(1000),
                    kind: NotificationKind::Assignment,
                    title: format!("Assignment {i}"),
                    body: "due soon".into(),
                    priority: Priority::Medium,
                    read: false,
                    created_at: Utc::now(),
                    sender: None,
                    link: None,
                    metadata: None,
                })
                .collect::<Vec<_>>();
            Arc::new(Self {
                page: Mutex::new(FeedPage {
                    unread_count: notifications.len() as u64,
                    notifications,
                }),
                fail_mutations: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl PortalApi for FlakyApi {
        async fn list_conversations(&self) -> AppResult<Vec<Conversation>> {
            Ok(Vec::new())
        }
        async fn conversation_messages(&self, _: Uuid) -> AppResult<Vec<Message>> {
            Ok(Vec::new())
        }
        async fn start_conversation(&self, _: Uuid) -> AppResult<Conversation> {
            Err(AppError::Persistence("unused".into()))
        }
        async fn post_message(&self, _: Uuid, _: &str, _: Uuid) -> AppResult<Message> {
            Err(AppError::Persistence("unused".into()))
        }
        async fn notifications(&self, _: usize) -> AppResult<FeedPage> {
            Ok(self.page.lock().unwrap().clone())
        }
        async fn mark_notification_read(&self, id: Uuid) -> AppResult<()> {
            if self.fail_mutations.load(Ordering::SeqCst) {
                return Err(AppError::from_status(500, "mark read"));
            }
            let mut page = self.page.lock().unwrap();
            let page = &mut *page;
            if let Some(n) = page.notifications.iter_mut().find(|n| n.id == id) {
                if !n.read {
                    n.read = true;
                    page.unread_count -= 1;
                }
            }
            Ok(())
        }
        async fn mark_all_notifications_read(&self) -> AppResult<()> {
            if self.fail_mutations.load(Ordering::SeqCst) {
                return Err(AppError::from_status(500, "mark all read"));
            }
            let mut page = self.page.lock().unwrap();
            let page = &mut *page;
            for n in &mut page.notifications {
                n.read = true;
            }
            page.unread_count = 0;
            Ok(())
        }
        async fn delete_notification(&self, id: Uuid) -> AppResult<()> {
            if self.fail_mutations.load(Ordering::SeqCst) {
                return Err(AppError::from_status(500, "delete"));
            }
            let mut page = self.page.lock().unwrap();
            let page = &mut *page;
            if let Some(pos) = page.notifications.iter().position(|n| n.id == id) {
                let removed = page.notifications.remove(pos);
                if !removed.read {
                    page.unread_count -= 1;
                }
            }
            Ok(())
        }
        async fn search_users(&self, _: &str, _: Option<UserRole>) -> AppResult<Vec<User>> {
            Ok(Vec::new())
        }
    }

    fn feed_over(api: Arc<FlakyApi>) -> Arc<NotificationFeed> {
        let mut config = Config::test_defaults();
        config.poll_interval = Duration::from_millis(20);
        NotificationFeed::new(api, &config)
    }

    #[tokio::test]
    async fn mark_read_is_optimistic_and_decrements_once() {
        let api = FlakyApi::with_unread(2);
        let feed = feed_over(Arc::clone(&api));
        feed.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(feed.unread_count(), 2);

        let id = feed.page().notifications[0].id;
        feed.stop();
        feed.mark_read(id).await;
        assert_eq!(feed.unread_count(), 1);

        // A second mark of the same id must not decrement again.
        feed.mark_read(id).await;
        assert_eq!(feed.unread_count(), 1);
    }

    #[tokio::test]
    async fn failed_mark_all_read_keeps_optimistic_state_and_surfaces() {
        let api = FlakyApi::with_unread(5);
        let feed = feed_over(Arc::clone(&api));
        let mut errors = feed.subscribe_errors();

        feed.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        feed.stop();
        assert_eq!(feed.unread_count(), 5);

        api.fail_mutations.store(true, Ordering::SeqCst);
        feed.mark_all_read().await;
        assert_eq!(feed.unread_count(), 0);
        let err = errors.try_recv().expect("an error should be surfaced");
        assert!(matches!(err, AppError::Persistence(_)));

        // Next successful poll reconciles back to the server's truth.
        feed.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        feed.stop();
        assert_eq!(feed.unread_count(), 5);
    }

    #[tokio::test]
    async fn delete_removes_locally_even_when_the_server_fails() {
        let api = FlakyApi::with_unread(1);
        let feed = feed_over(Arc::clone(&api));
        feed.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        feed.stop();

        api.fail_mutations.store(true, Ordering::SeqCst);
        let id = feed.page().notifications[0].id;
        let mut errors = feed.subscribe_errors();
        feed.delete(id).await;

        assert!(feed.page().notifications.is_empty());
        assert_eq!(feed.unread_count(), 0);
        assert!(errors.try_recv().is_ok());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_halts_polling() {
        let api = FlakyApi::with_unread(1);
        let feed = feed_over(api);
        feed.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        feed.stop();
        feed.stop();
        assert_eq!(feed.unread_count(), 1);
    }
}
