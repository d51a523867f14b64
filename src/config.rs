use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the portal REST API, e.g. `https://portal.example.edu/api`.
    pub api_base_url: String,
    /// WebSocket endpoint of the event channel.
    pub channel_url: String,
    /// Reconnect attempts per drop before giving up.
    pub reconnect_max_attempts: u32,
    /// Base reconnect delay; attempt N waits N times this.
    pub reconnect_delay: Duration,
    /// Notification feed poll cadence.
    pub poll_interval: Duration,
    /// Page size for notification polls.
    pub notification_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let api_base_url = env::var("PORTAL_API_URL")
            .map_err(|_| AppError::Config("PORTAL_API_URL missing".into()))?;
        let channel_url = env::var("PORTAL_CHANNEL_URL")
            .unwrap_or_else(|_| derive_channel_url(&api_base_url));
        let reconnect_max_attempts = env::var("PORTAL_RECONNECT_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);
        let reconnect_delay = env::var("PORTAL_RECONNECT_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_secs(1));
        let poll_interval = env::var("PORTAL_NOTIFICATION_POLL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(30));
        let notification_limit = env::var("PORTAL_NOTIFICATION_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50);

        Ok(Self {
            api_base_url,
            channel_url,
            reconnect_max_attempts,
            reconnect_delay,
            poll_interval,
            notification_limit,
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:3000/api".into(),
            channel_url: "ws://127.0.0.1:3000/ws".into(),
            reconnect_max_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(30),
            notification_limit: 50,
        }
    }
}

/// Same origin as the API, ws scheme, `/ws` path.
fn derive_channel_url(api_base_url: &str) -> String {
    let ws = api_base_url
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    format!("{}/ws", ws.trim_end_matches('/'))
}
