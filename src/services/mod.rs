pub mod conversation_store;
pub mod message_channel;
pub mod notification_feed;
pub mod presence;

pub use conversation_store::ConversationStore;
pub use message_channel::MessageChannel;
pub use notification_feed::NotificationFeed;
pub use presence::PresenceRegistry;
