//! Valkey/Redis backends for the record collection and notification channel.

use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{redis, Config, Pool, Runtime};
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::{RegistryError, Result};
use crate::record::{ChangeEvent, Record};
use crate::traits::{EventChannel, RecordStore};

/// Valkey/Redis record collection.
///
/// Records live in a hash keyed by registration id, which gives the
/// replace-by-identity semantics `update` relies on and a keyed lookup
/// path for single-record reads.
#[derive(Clone)]
pub struct ValkeyStore {
    pool: Pool,
    key: String,
}

impl ValkeyStore {
    /// Connects and verifies the connection with a PING.
    pub async fn new(url: &str, key: impl Into<String>, pool_size: usize) -> Result<Self> {
        let pool = connect(url, pool_size).await?;
        Ok(Self {
            pool,
            key: key.into(),
        })
    }
}

#[async_trait]
impl RecordStore for ValkeyStore {
    async fn put(&self, record: &Record) -> Result<()> {
        let id = record
            .registration
            .as_deref()
            .ok_or(RegistryError::MissingRegistration)?;
        let json = serde_json::to_string(record)
            .map_err(|e| RegistryError::Serialisation(e.to_string()))?;

        let mut conn = self.pool.get().await?;
        conn.hset::<_, _, _, ()>(&self.key, id, json).await?;
        Ok(())
    }

    async fn remove(&self, registration: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let removed: i64 = conn.hdel(&self.key, registration).await?;
        Ok(removed > 0)
    }

    async fn get(&self, registration: &str) -> Result<Option<Record>> {
        let mut conn = self.pool.get().await?;
        let json: Option<String> = conn.hget(&self.key, registration).await?;

        match json {
            Some(json) => {
                let record = serde_json::from_str(&json)
                    .map_err(|e| RegistryError::Serialisation(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Record>> {
        let mut conn = self.pool.get().await?;
        let entries: Vec<String> = conn.hvals(&self.key).await?;

        entries
            .iter()
            .map(|json| {
                serde_json::from_str(json).map_err(|e| RegistryError::Serialisation(e.to_string()))
            })
            .collect()
    }
}

/// Valkey/Redis notification channel.
///
/// Publishes through the shared pool; a dedicated pub/sub connection runs
/// in a background task and fans incoming payloads out to local
/// subscribers.
#[derive(Clone)]
pub struct ValkeyChannel {
    pool: Pool,
    channel: String,
    sender: broadcast::Sender<String>,
}

impl ValkeyChannel {
    /// Connects, subscribes to the channel, and starts the receive task.
    pub async fn new(url: &str, channel: impl Into<String>, pool_size: usize) -> Result<Self> {
        let channel = channel.into();
        let pool = connect(url, pool_size).await?;

        // Pub/sub needs its own connection outside the pool.
        let client = redis::Client::open(url)?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;

        let (sender, _) = broadcast::channel(1024);
        let fanout = sender.clone();
        let name = channel.clone();

        tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            while let Some(message) = messages.next().await {
                match message.get_payload::<String>() {
                    // A send error only means there is no local subscriber.
                    Ok(payload) => {
                        let _ = fanout.send(payload);
                    }
                    Err(e) => {
                        warn!(channel = %name, error = %e, "Discarding undecodable message");
                    }
                }
            }
            warn!(channel = %name, "Pub/sub connection closed");
        });

        Ok(Self {
            pool,
            channel,
            sender,
        })
    }
}

#[async_trait]
impl EventChannel for ValkeyChannel {
    async fn publish(&self, event: &ChangeEvent) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: i64 = conn.publish(&self.channel, event.to_wire()).await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

async fn connect(url: &str, pool_size: usize) -> Result<Pool> {
    let config = Config::from_url(url);
    let pool = config
        .builder()
        .map_err(|e| RegistryError::Config(e.to_string()))?
        .max_size(pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| RegistryError::Config(e.to_string()))?;

    // Test the connection
    let mut conn = pool.get().await?;
    redis::cmd("PING").query_async::<String>(&mut *conn).await?;

    Ok(pool)
}

impl std::fmt::Debug for ValkeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeyStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ValkeyChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeyChannel")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
