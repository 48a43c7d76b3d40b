//! Backend traits for the shared collection and the notification channel.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::record::{ChangeEvent, Record};

/// The shared collection holding all current records.
///
/// Implementations must provide replace-by-identity semantics: a `put`
/// with an already-present registration id overwrites that entry.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts or replaces a record, keyed by its registration id.
    async fn put(&self, record: &Record) -> Result<()>;

    /// Removes the entry for a registration id.
    ///
    /// Returns `false` when the id was not present.
    async fn remove(&self, registration: &str) -> Result<bool>;

    /// Looks up a single record by registration id.
    async fn get(&self, registration: &str) -> Result<Option<Record>>;

    /// Reads the full contents of the collection.
    ///
    /// Iteration order is whatever the backend yields; it is not stable
    /// across calls.
    async fn list(&self) -> Result<Vec<Record>>;
}

/// The notification channel broadcasting change events to all subscribers.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Publishes an event to every subscriber, local and remote.
    async fn publish(&self, event: &ChangeEvent) -> Result<()>;

    /// Subscribes to raw wire payloads as they arrive on the channel.
    fn subscribe(&self) -> broadcast::Receiver<String>;
}
