pub mod connection;
pub mod events;
pub mod transport;

pub use connection::{ChannelEvent, ChannelStatus, ConnectionManager};
pub use events::{ClientEvent, ServerEvent};
pub use transport::{EventChannel, EventSink, EventStream, Transport, WsTransport};
