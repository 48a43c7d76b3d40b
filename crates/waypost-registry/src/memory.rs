//! In-memory backends for tests and single-process use.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use crate::error::{RegistryError, Result};
use crate::record::{ChangeEvent, Record};
use crate::traits::{EventChannel, RecordStore};

/// In-memory record collection.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<String, Record>>>,
}

impl MemoryStore {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn put(&self, record: &Record) -> Result<()> {
        let id = record
            .registration
            .clone()
            .ok_or(RegistryError::MissingRegistration)?;
        let mut records = self.records.write().await;
        records.insert(id, record.clone());
        Ok(())
    }

    async fn remove(&self, registration: &str) -> Result<bool> {
        let mut records = self.records.write().await;
        Ok(records.remove(registration).is_some())
    }

    async fn get(&self, registration: &str) -> Result<Option<Record>> {
        let records = self.records.read().await;
        Ok(records.get(registration).cloned())
    }

    async fn list(&self) -> Result<Vec<Record>> {
        let records = self.records.read().await;
        Ok(records.values().cloned().collect())
    }
}

/// In-memory notification channel over a broadcast queue.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    sender: broadcast::Sender<String>,
}

impl MemoryChannel {
    /// Creates a channel with room for 1024 in-flight payloads.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventChannel for MemoryChannel {
    async fn publish(&self, event: &ChangeEvent) -> Result<()> {
        // A send error only means there is no subscriber right now.
        let _ = self.sender.send(event.to_wire());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}
