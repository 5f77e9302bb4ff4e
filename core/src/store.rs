//! Parameter Gateway (C1), Event Bus transport (C2), and Key/Value Store
//! (C3), all backed by a single Redis instance — it already plays all
//! three roles in the original system (pub/sub broker, hash store, list
//! store for the free-host pool).

use crate::error::Result;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{info, warn};

#[derive(Clone)]
pub struct Store {
    conn: MultiplexedConnection,
}

impl Store {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }

    // ---- C3: key/value store -------------------------------------------------

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.conn.clone().get(key).await?)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.clone().set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.conn.clone().hget(key, field).await?)
    }

    pub async fn hgetall(&self, key: &str) -> Result<std::collections::HashMap<String, String>> {
        Ok(self.conn.clone().hgetall(key).await?)
    }

    /// Reads a plain Redis list in full, e.g. `<product_id>:antennas`.
    pub async fn list(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.conn.clone().lrange(key, 0, -1).await?)
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.conn.clone().del::<_, ()>(key).await?;
        Ok(())
    }

    /// Stores a JSON-serializable value at `key`, used for sensor
    /// snapshots, stream descriptor maps, and schedule-block results.
    pub async fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| crate::error::CoordinatorError::Store(redis::RedisError::from((
                redis::ErrorKind::TypeError,
                "json encode failed",
                e.to_string(),
            ))))?;
        self.set(key, &raw).await
    }

    /// Appends a timestamped snapshot to a sensor's history hash, keyed
    /// by a `%Y%m%dT%H%M%S.000Z`-style timestamp string (grounded in
    /// `katportal_server.py::save_history`).
    pub async fn save_history(&self, product_id: &str, sensor: &str, timestamp: &str, value: &str) -> Result<()> {
        let key = format!("history:{product_id}:{sensor}");
        self.conn.clone().hset::<_, _, _, ()>(key, timestamp, value).await?;
        Ok(())
    }

    // ---- free-host pool (single-writer: the coordinator event loop) ---------

    pub async fn free_pool_len(&self) -> Result<usize> {
        Ok(self.conn.clone().llen("coordinator:free_hosts").await?)
    }

    pub async fn seed_free_pool(&self, hosts: &[String]) -> Result<()> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen("coordinator:free_hosts").await?;
        if len == 0 && !hosts.is_empty() {
            conn.rpush::<_, _, ()>("coordinator:free_hosts", hosts).await?;
            info!("Seeded free host pool with {} hosts", hosts.len());
        }
        Ok(())
    }

    /// Allocates up to `count` hosts from the free pool to `product_id`.
    /// Returns fewer than `count` (possibly zero) if the pool is short —
    /// callers must warn and proceed with partial allocation rather than
    /// abort (§7 Allocation shortage).
    pub async fn allocate_hosts(&self, product_id: &str, count: usize) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let available: usize = conn.llen("coordinator:free_hosts").await?;
        let take = count.min(available);
        if take == 0 {
            if count > 0 {
                warn!("No free hosts available to allocate to {product_id}");
            }
            return Ok(Vec::new());
        }
        let hosts: Vec<String> = conn.lrange("coordinator:free_hosts", 0, take as isize - 1).await?;
        redis::pipe()
            .atomic()
            .ltrim("coordinator:free_hosts", take as isize, -1)
            .rpush(format!("coordinator:allocated_hosts:{product_id}"), &hosts)
            .query_async::<()>(&mut conn)
            .await?;
        if take < count {
            warn!(
                "Only {take} of {count} requested hosts available for {product_id}; proceeding with partial allocation"
            );
        }
        Ok(hosts)
    }

    pub async fn allocated_hosts(&self, product_id: &str) -> Result<Vec<String>> {
        Ok(self.conn.clone().lrange(format!("coordinator:allocated_hosts:{product_id}"), 0, -1).await?)
    }

    /// Releases `product_id`'s allocation back to the free pool and
    /// deletes its allocation record.
    pub async fn release_hosts(&self, product_id: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let key = format!("coordinator:allocated_hosts:{product_id}");
        let hosts: Vec<String> = conn.lrange(&key, 0, -1).await?;
        if !hosts.is_empty() {
            redis::pipe()
                .atomic()
                .rpush("coordinator:free_hosts", &hosts)
                .del(&key)
                .query_async::<()>(&mut conn)
                .await?;
        } else {
            conn.del::<_, ()>(&key).await?;
        }
        Ok(hosts)
    }

    // ---- C1: parameter gateway ------------------------------------------------

    /// Publishes `KEY=VALUE` to a node's per-host channel, mirroring the
    /// write to the channel's hash *before* publishing — so a restarted
    /// node can reconstruct state from the mirror even if it missed the
    /// broadcast (§4.1 ordering invariant; deliberately differs from the
    /// literal publish-then-mirror order in the original Python).
    pub async fn publish_param(&self, domain: &str, host: &str, key: &str, value: &str) -> Result<()> {
        let channel = format!("{domain}://{host}/set");
        self.mirror_write(&channel, key, value).await;
        self.publish_best_effort(&channel, &format!("{key}={value}")).await;
        Ok(())
    }

    async fn mirror_write(&self, channel: &str, key: &str, value: &str) {
        let mut conn = self.conn.clone();
        if let Err(e) = conn.hset::<_, _, _, ()>(channel, key, value).await {
            warn!("Failed to mirror {key} to {channel}: {e}");
        }
    }

    /// Best-effort publish: logs and swallows errors rather than
    /// propagating, matching `redis_tools.py::publish_to_redis`.
    async fn publish_best_effort(&self, channel: &str, message: &str) {
        let mut conn = self.conn.clone();
        if let Err(e) = conn.publish::<_, _, ()>(channel, message).await {
            warn!("Failed to publish to {channel}: {e}");
        } else {
            info!("Wrote {message} to {channel}");
        }
    }

    pub async fn status_hash(&self, domain: &str, host: &str) -> Result<std::collections::HashMap<String, String>> {
        self.hgetall(&format!("{domain}://{host}/status")).await
    }

    /// Publishes a plain message (not a `KEY=VALUE` parameter) to an
    /// arbitrary channel, e.g. the chat-proxy or trigger-control channel.
    pub async fn publish_message(&self, channel: &str, message: &str) -> Result<()> {
        self.publish_best_effort(channel, message).await;
        Ok(())
    }

    // ---- subarray-scoped state (§3.1, §6 store layout) -----------------------

    /// Reads a cached sensor snapshot written by the metadata fetcher.
    pub async fn get_sensor(&self, product_id: &str, sensor_name: &str) -> Result<Option<String>> {
        self.get(&format!("{product_id}:{sensor_name}")).await
    }

    pub async fn set_sensor(&self, product_id: &str, sensor_name: &str, value: &str) -> Result<()> {
        self.set(&format!("{product_id}:{sensor_name}"), value).await
    }

    pub async fn get_trigger_mode(&self, product_id: &str) -> Result<String> {
        match self.get(&format!("coordinator:trigger_mode:{product_id}")).await? {
            Some(mode) => Ok(mode),
            None => self.get_default_trigger_mode().await,
        }
    }

    pub async fn set_trigger_mode(&self, product_id: &str, mode: &str) -> Result<()> {
        self.set(&format!("coordinator:trigger_mode:{product_id}"), mode).await
    }

    pub async fn get_default_trigger_mode(&self) -> Result<String> {
        Ok(self.get("coordinator:trigger_mode").await?.unwrap_or_else(|| "idle".to_string()))
    }

    pub async fn set_default_trigger_mode(&self, mode: &str) -> Result<()> {
        self.set("coordinator:trigger_mode", mode).await
    }

    pub async fn is_tracking(&self, product_id: &str) -> Result<bool> {
        Ok(self.get(&format!("coordinator:tracking:{product_id}")).await?.as_deref() == Some("1"))
    }

    pub async fn set_tracking(&self, product_id: &str, tracking: bool) -> Result<()> {
        self.set(&format!("coordinator:tracking:{product_id}"), if tracking { "1" } else { "0" }).await
    }

    /// Deletes a deconfigured subarray's trigger-mode and tracking state,
    /// on top of the allocation-list cleanup `release_hosts` already does.
    pub async fn clear_subarray_state(&self, product_id: &str) -> Result<()> {
        self.delete(&format!("coordinator:trigger_mode:{product_id}")).await?;
        self.delete(&format!("coordinator:tracking:{product_id}")).await?;
        Ok(())
    }
}
