//! The record registry: mutation sequencing and event publication.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::config::{BackendConfig, RegistryConfig};
use crate::dispatch::{EventDispatcher, EventKind};
use crate::error::{RegistryError, Result};
use crate::memory::{MemoryChannel, MemoryStore};
use crate::record::{ChangeEvent, Operation, Record};
use crate::traits::{EventChannel, RecordStore};
use crate::valkey::{ValkeyChannel, ValkeyStore};

/// A distributed service record registry.
///
/// Mutations go to the shared collection first; once the outcome is known,
/// a tagged change event is published on the notification channel — a
/// domain event on success, an `error` event on failure. The
/// caller-visible result never waits on notification delivery.
pub struct Registry {
    records: Arc<dyn RecordStore>,
    events: mpsc::UnboundedSender<ChangeEvent>,
    dispatcher: Arc<EventDispatcher>,
}

impl Registry {
    /// Builds a registry from configuration and starts its dispatch loop.
    ///
    /// Must be called within a Tokio runtime; the registry's background
    /// tasks are spawned onto it.
    pub async fn connect(config: &RegistryConfig) -> Result<Self> {
        let (records, channel): (Arc<dyn RecordStore>, Arc<dyn EventChannel>) =
            match &config.backend {
                BackendConfig::Memory => {
                    (Arc::new(MemoryStore::new()), Arc::new(MemoryChannel::new()))
                }
                BackendConfig::Valkey { url, pool_size } => {
                    let store = ValkeyStore::new(url, config.key.clone(), *pool_size).await?;
                    let channel = ValkeyChannel::new(url, config.channel.clone(), *pool_size).await?;
                    (Arc::new(store), Arc::new(channel))
                }
            };

        Ok(Self::with_backends(records, channel))
    }

    /// Wires a registry over explicit backends and starts its dispatch loop.
    ///
    /// The loop runs until the channel closes; it receives every event on
    /// the channel, including those this registry published itself. Events
    /// this registry publishes are drained by a single publisher task, so
    /// they reach the channel in the order their operations completed.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; the dispatch and
    /// publisher tasks are spawned onto it.
    pub fn with_backends(records: Arc<dyn RecordStore>, channel: Arc<dyn EventChannel>) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new());
        let messages = channel.subscribe();
        let loop_dispatcher = dispatcher.clone();
        tokio::spawn(async move { loop_dispatcher.run(messages).await });

        let (events, mut pending) = mpsc::unbounded_channel::<ChangeEvent>();
        tokio::spawn(async move {
            while let Some(event) = pending.recv().await {
                if let Err(e) = channel.publish(&event).await {
                    warn!(error = %e, "Failed to publish change event");
                }
            }
        });

        Self {
            records,
            events,
            dispatcher,
        }
    }

    /// Replaces the handler slot for an event kind.
    ///
    /// Returns `&Self` so handlers can be registered in a chain.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> &Self
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        self.dispatcher.on(kind, handler);
        self
    }

    /// Stores an unregistered record, assigning its registration id.
    ///
    /// Fails with [`RegistryError::AlreadyRegistered`] if the record
    /// already carries an id; in that case nothing is mutated and no event
    /// is published.
    pub async fn store(&self, mut record: Record) -> Result<Record> {
        if let Some(id) = &record.registration {
            return Err(RegistryError::AlreadyRegistered(id.clone()));
        }
        record.registration = Some(Uuid::new_v4().to_string());

        match self.records.put(&record).await {
            Ok(()) => {
                self.publish(ChangeEvent::Store {
                    record: record.clone(),
                });
                Ok(record)
            }
            Err(e) => {
                self.publish_failure(&e, Operation::Store);
                Err(e)
            }
        }
    }

    /// Removes the entry for a registration id.
    ///
    /// Removing an id that is not present fails with
    /// [`RegistryError::NotFound`] and publishes an `error` event. On
    /// success the returned record carries only the removed id.
    pub async fn remove(&self, registration: &str) -> Result<Record> {
        if registration.is_empty() {
            return Err(RegistryError::MissingRegistration);
        }

        match self.try_remove(registration).await {
            Ok(record) => {
                self.publish(ChangeEvent::Remove {
                    record: record.clone(),
                });
                Ok(record)
            }
            Err(e) => {
                self.publish_failure(&e, Operation::Remove);
                Err(e)
            }
        }
    }

    /// Convenience form of [`Registry::remove`] taking the record itself.
    pub async fn remove_record(&self, record: &Record) -> Result<Record> {
        let id = record
            .registration
            .as_deref()
            .ok_or(RegistryError::MissingRegistration)?;
        self.remove(id).await
    }

    /// Re-stores a registered record, replacing the entry with the same id.
    pub async fn update(&self, record: &Record) -> Result<()> {
        if record.registration.is_none() {
            return Err(RegistryError::MissingRegistration);
        }

        match self.records.put(record).await {
            Ok(()) => {
                self.publish(ChangeEvent::Update {
                    record: record.clone(),
                });
                Ok(())
            }
            Err(e) => {
                self.publish_failure(&e, Operation::Update);
                Err(e)
            }
        }
    }

    /// Reads the full contents of the shared collection.
    ///
    /// Reads are not mutations; no event is published, not even on failure.
    pub async fn list(&self) -> Result<Vec<Record>> {
        self.records.list().await
    }

    /// Looks up a single record by registration id.
    pub async fn get_record(&self, registration: &str) -> Result<Option<Record>> {
        if registration.is_empty() {
            return Err(RegistryError::MissingRegistration);
        }
        self.records.get(registration).await
    }

    async fn try_remove(&self, registration: &str) -> Result<Record> {
        if self.records.remove(registration).await? {
            Ok(Record::from_registration(registration))
        } else {
            Err(RegistryError::NotFound(registration.to_owned()))
        }
    }

    /// Hands the event to the publisher task, so the caller-visible result
    /// is independent of notification delivery while per-registry issue
    /// order is preserved. Publish failures are logged, never surfaced to
    /// the caller.
    fn publish(&self, event: ChangeEvent) {
        if self.events.send(event).is_err() {
            warn!("Publisher task gone, change event dropped");
        }
    }

    fn publish_failure(&self, error: &RegistryError, when: Operation) {
        self.publish(ChangeEvent::Error {
            error: error.to_string(),
            when,
        });
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tokio::time::timeout;

    fn memory_registry() -> (Registry, broadcast::Receiver<String>) {
        let channel = MemoryChannel::new();
        let events = channel.subscribe();
        let registry = Registry::with_backends(Arc::new(MemoryStore::new()), Arc::new(channel));
        (registry, events)
    }

    async fn next_event(events: &mut broadcast::Receiver<String>) -> ChangeEvent {
        let payload = timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("Timed out waiting for an event")
            .expect("Event channel closed");
        ChangeEvent::from_wire(&payload)
    }

    async fn assert_no_event(events: &mut broadcast::Receiver<String>) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn store_assigns_id_and_publishes() {
        let (registry, mut events) = memory_registry();

        let stored = registry
            .store(Record::new("awesome", "127.0.0.1:9091"))
            .await
            .unwrap();

        let id = stored.registration.clone().expect("id assigned");
        assert!(!id.is_empty());

        match next_event(&mut events).await {
            ChangeEvent::Store { record } => {
                assert_eq!(record.registration, Some(id));
                assert_eq!(record.name, "awesome");
                assert_eq!(record.address, "127.0.0.1:9091");
            }
            other => panic!("Expected a store event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn store_twice_fails_without_mutation_or_event() {
        let (registry, mut events) = memory_registry();

        let stored = registry
            .store(Record::new("awesome", "127.0.0.1:9091"))
            .await
            .unwrap();
        next_event(&mut events).await;

        let result = registry.store(stored).await;
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));

        assert_eq!(registry.list().await.unwrap().len(), 1);
        assert_no_event(&mut events).await;
    }

    #[tokio::test]
    async fn remove_publishes_minimal_record() {
        let (registry, mut events) = memory_registry();

        let stored = registry
            .store(Record::new("awesome", "127.0.0.1:9091"))
            .await
            .unwrap();
        next_event(&mut events).await;

        let id = stored.registration.clone().unwrap();
        let removed = registry.remove(&id).await.unwrap();
        assert_eq!(removed.registration, Some(id.clone()));
        assert!(removed.name.is_empty());

        match next_event(&mut events).await {
            ChangeEvent::Remove { record } => assert_eq!(record.registration, Some(id)),
            other => panic!("Expected a remove event, got {other:?}"),
        }
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_empty_id_fails_without_event() {
        let (registry, mut events) = memory_registry();

        let result = registry.remove("").await;
        assert!(matches!(result, Err(RegistryError::MissingRegistration)));
        assert_no_event(&mut events).await;
    }

    #[tokio::test]
    async fn remove_unknown_id_fails_and_publishes_error() {
        let (registry, mut events) = memory_registry();

        let result = registry.remove("never-stored").await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));

        match next_event(&mut events).await {
            ChangeEvent::Error { when, error } => {
                assert_eq!(when, Operation::Remove);
                assert!(error.contains("never-stored"));
            }
            other => panic!("Expected an error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn remove_record_requires_registration() {
        let (registry, _events) = memory_registry();

        let result = registry
            .remove_record(&Record::new("awesome", "127.0.0.1:9091"))
            .await;
        assert!(matches!(result, Err(RegistryError::MissingRegistration)));
    }

    #[tokio::test]
    async fn update_replaces_and_publishes() {
        let (registry, mut events) = memory_registry();

        let mut stored = registry
            .store(Record::new("awesome", "127.0.0.1:9091"))
            .await
            .unwrap();
        next_event(&mut events).await;

        stored.address = "127.0.0.1:9092".to_owned();
        registry.update(&stored).await.unwrap();

        match next_event(&mut events).await {
            ChangeEvent::Update { record } => assert_eq!(record.address, "127.0.0.1:9092"),
            other => panic!("Expected an update event, got {other:?}"),
        }

        let records = registry.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].address, "127.0.0.1:9092");
    }

    #[tokio::test]
    async fn update_without_registration_fails() {
        let (registry, mut events) = memory_registry();

        let result = registry.update(&Record::new("awesome", "127.0.0.1:9091")).await;
        assert!(matches!(result, Err(RegistryError::MissingRegistration)));
        assert_no_event(&mut events).await;
    }

    #[tokio::test]
    async fn list_reflects_stores_and_removes() {
        let (registry, _events) = memory_registry();

        let mut ids = Vec::new();
        for i in 0..3 {
            let stored = registry
                .store(Record::new(format!("svc-{i}"), "127.0.0.1:9091"))
                .await
                .unwrap();
            ids.push(stored.registration.unwrap());
        }
        assert_eq!(registry.list().await.unwrap().len(), 3);

        registry.remove(&ids[0]).await.unwrap();
        assert_eq!(registry.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn get_record_finds_by_id() {
        let (registry, _events) = memory_registry();

        let stored = registry
            .store(Record::new("awesome", "127.0.0.1:9091"))
            .await
            .unwrap();
        let id = stored.registration.clone().unwrap();

        let found = registry.get_record(&id).await.unwrap().expect("present");
        assert_eq!(found, stored);

        assert!(registry.get_record("missing").await.unwrap().is_none());
        assert!(matches!(
            registry.get_record("").await,
            Err(RegistryError::MissingRegistration)
        ));
    }

    #[tokio::test]
    async fn store_event_reaches_registered_handler() {
        let (registry, _events) = memory_registry();
        let (seen, mut observed) = tokio::sync::mpsc::unbounded_channel();

        registry.on(EventKind::Store, move |event| {
            let _ = seen.send(event);
        });

        registry
            .store(Record::new("awesome", "127.0.0.1:9091"))
            .await
            .unwrap();

        let event = timeout(Duration::from_secs(1), observed.recv())
            .await
            .expect("Timed out waiting for the handler")
            .expect("Handler channel closed");
        match event {
            ChangeEvent::Store { record } => assert_eq!(record.name, "awesome"),
            other => panic!("Expected a store event, got {other:?}"),
        }
    }
}
