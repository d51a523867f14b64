pub mod conversation;
pub mod message;
pub mod notification;
pub mod user;

pub use conversation::Conversation;
pub use message::{DateGroup, DeliveryStatus, Message};
pub use notification::{Notification, NotificationKind, Priority};
pub use user::{User, UserRole};
