//! Event Bus consumer side (C2): subscribes to the three logical
//! channels and yields raw payloads for `event::parse_event` to decode.

use crate::error::Result;
use futures_util::StreamExt;
use redis::AsyncCommands;
use tracing::warn;

pub const LIFECYCLE_ALERTS_CHANNEL: &str = "alerts";
pub const SENSOR_ALERTS_CHANNEL: &str = "sensor_alerts";
pub const TRIGGER_CONTROL_CHANNEL: &str = "trigger_control";

/// A subscribed connection to one or more pub/sub channels. Each
/// received message is the raw payload string (`<type>:<description>[:<value>]`);
/// callers run it through `event::parse_event`.
pub struct Subscription {
    conn: redis::aio::PubSub,
}

impl Subscription {
    pub async fn connect(redis_url: &str, channels: &[&str]) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = client.get_async_pubsub().await?;
        for channel in channels {
            conn.subscribe(*channel).await?;
        }
        Ok(Self { conn })
    }

    /// Awaits the next message, returning its payload. Never returns
    /// `Err` for a malformed payload — that's the caller's job via
    /// `parse_event`; this only errors on a broken connection.
    pub async fn next_payload(&mut self) -> Option<String> {
        let mut stream = self.conn.on_message();
        match stream.next().await {
            Some(msg) => match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!("Failed to decode pub/sub payload: {e}");
                    None
                }
            },
            None => None,
        }
    }
}

/// Publishes on-behalf-of the chat-notification proxy (§6.1). The proxy
/// itself is an external collaborator; this repo only formats and
/// publishes the message it expects.
pub struct ChatNotifier {
    redis_url: String,
}

impl ChatNotifier {
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self { redis_url: redis_url.into() }
    }

    pub async fn notify(&self, slack_channel: &str, message: &str) -> Result<()> {
        let client = redis::Client::open(self.redis_url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let payload = format!("{slack_channel}:{message}");
        if let Err(e) = conn.publish::<_, _, ()>(crate::config::PROXY_CHANNEL, &payload).await {
            warn!("Failed to notify chat proxy: {e}");
        }
        Ok(())
    }
}
