//! Distributed service record registry over a shared Valkey/Redis store.
//!
//! The registry keeps a replicated catalog of service endpoints that any
//! number of independent processes can register into, query, and watch:
//!
//! - **Record registry**: `store`/`remove`/`update`/`list` against the
//!   shared collection, with registration ids assigned on first store
//! - **Change notification**: every successful mutation is paired with
//!   exactly one tagged event on the notification channel; a failed
//!   mutation is reported to the caller *and* published as an `error` event
//! - **Event fan-out**: a dispatcher classifies incoming events by their
//!   action discriminator and routes each to exactly one per-kind handler
//!
//! Consistency is delegated to the shared store (Valkey/Redis, or the
//! in-memory backend for tests); the registry sequences mutation,
//! persistence, and notification on top of it.
//!
//! # Example
//!
//! ```ignore
//! use waypost_registry::{EventKind, Record, Registry, RegistryConfig};
//!
//! let registry = Registry::connect(&RegistryConfig::default()).await?;
//! registry.on(EventKind::Store, |event| println!("stored: {event:?}"));
//!
//! let stored = registry.store(Record::new("awesome", "127.0.0.1:9091")).await?;
//! println!("registered as {:?}", stored.registration);
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod memory;
pub mod record;
pub mod registry;
pub mod traits;
pub mod valkey;

// Re-export main types
pub use config::{BackendConfig, RegistryConfig};
pub use dispatch::{EventDispatcher, EventHandler, EventKind};
pub use error::{RegistryError, Result};
pub use memory::{MemoryChannel, MemoryStore};
pub use record::{ChangeEvent, Operation, Record};
pub use registry::Registry;
pub use traits::{EventChannel, RecordStore};
pub use valkey::{ValkeyChannel, ValkeyStore};
