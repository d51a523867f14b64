//! Realtime messaging and notification core for the campus portal client.
//!
//! One persistent event channel per signed-in session carries message
//! echoes, presence and conversation updates; durable writes and the
//! notification feed go over REST. See `RealtimeClient` for the wiring.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod websocket;

pub use client::RealtimeClient;
pub use config::Config;
pub use error::{AppError, AppResult};
