//! A single subarray's websocket session against the telescope sensor
//! API, grounded in `katportal_server.py`'s per-product `KATPortalClient`
//! wrapper. Request/response pairs are correlated by a monotonic id;
//! unsolicited sensor updates arrive as their own frames and are
//! delivered through `next_update`.

use bluse_core::error::CoordinatorError;
use bluse_core::Result;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::warn;

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Vec<String>,
}

#[derive(Deserialize, Default)]
struct Frame {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    update: Option<SensorUpdate>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SensorUpdate {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub status: String,
}

pub struct Session {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
}

impl Session {
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| CoordinatorError::Fetch(format!("connect to {url} failed: {e}")))?;
        Ok(Self { ws, next_id: 0 })
    }

    async fn call(&mut self, method: &str, params: Vec<String>) -> Result<serde_json::Value> {
        self.next_id += 1;
        let id = self.next_id;
        let request = Request { id, method, params };
        let payload = serde_json::to_string(&request)
            .map_err(|e| CoordinatorError::Fetch(format!("encoding {method} request: {e}")))?;
        self.ws
            .send(Message::Text(payload))
            .await
            .map_err(|e| CoordinatorError::Fetch(format!("sending {method} request: {e}")))?;

        loop {
            let message = self
                .ws
                .next()
                .await
                .ok_or_else(|| CoordinatorError::Fetch("connection closed while awaiting response".into()))?
                .map_err(|e| CoordinatorError::Fetch(e.to_string()))?;
            let Message::Text(text) = message else { continue };
            let frame: Frame = serde_json::from_str(&text)
                .map_err(|e| CoordinatorError::Fetch(format!("decoding {method} response: {e}")))?;
            if frame.id != Some(id) {
                continue;
            }
            if let Some(error) = frame.error {
                return Err(CoordinatorError::Fetch(format!("{method} failed: {error}")));
            }
            return frame
                .result
                .ok_or_else(|| CoordinatorError::Fetch(format!("{method} returned no result")));
        }
    }

    /// Resolves the full sensor names matching each of `targets` (substring
    /// search on the telescope side) and fetches their current values in
    /// one round trip, mirroring `_get_sensor_values`.
    pub async fn sensor_values(&mut self, targets: &[String]) -> Result<Vec<(String, String)>> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let result = self.call("sensor_values", targets.to_vec()).await?;
        let map: std::collections::HashMap<String, String> = serde_json::from_value(result)
            .map_err(|e| CoordinatorError::Fetch(format!("decoding sensor_values result: {e}")))?;
        Ok(map.into_iter().collect())
    }

    pub async fn schedule_blocks_assigned(&mut self) -> Result<Vec<String>> {
        let result = self.call("schedule_blocks_assigned", Vec::new()).await?;
        serde_json::from_value(result)
            .map_err(|e| CoordinatorError::Fetch(format!("decoding schedule_blocks_assigned: {e}")))
    }

    pub async fn future_targets(&mut self, sb_id: &str) -> Result<serde_json::Value> {
        self.call("future_targets", vec![sb_id.to_string()]).await
    }

    pub async fn subscribe(&mut self, sensors: &[String]) -> Result<()> {
        if sensors.is_empty() {
            return Ok(());
        }
        self.call("subscribe", sensors.to_vec()).await?;
        Ok(())
    }

    pub async fn unsubscribe(&mut self, sensors: &[String]) -> Result<()> {
        if sensors.is_empty() {
            return Ok(());
        }
        self.call("unsubscribe", sensors.to_vec()).await?;
        Ok(())
    }

    /// Awaits the next unsolicited sensor update frame, skipping any
    /// stray request/response frames interleaved on the same socket.
    pub async fn next_update(&mut self) -> Option<SensorUpdate> {
        loop {
            let message = match self.ws.next().await? {
                Ok(m) => m,
                Err(e) => {
                    warn!("websocket error while awaiting sensor update: {e}");
                    return None;
                }
            };
            let Message::Text(text) = message else { continue };
            match serde_json::from_str::<Frame>(&text) {
                Ok(frame) => {
                    if let Some(update) = frame.update {
                        return Some(update);
                    }
                }
                Err(e) => warn!("failed to decode sensor update frame: {e}"),
            }
        }
    }
}
