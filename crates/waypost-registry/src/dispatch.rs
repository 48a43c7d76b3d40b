//! Event classification and fan-out to per-kind handlers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::record::ChangeEvent;

/// Callback invoked with every event routed to its slot.
pub type EventHandler = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// The handler slot an event routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `store` events.
    Store,
    /// `remove` events.
    Remove,
    /// `update` events.
    Update,
    /// `error` events.
    Error,
    /// Events with an unrecognized action.
    Other,
}

impl EventKind {
    /// The slot a decoded event routes to.
    #[must_use]
    pub fn of(event: &ChangeEvent) -> Self {
        match event {
            ChangeEvent::Store { .. } => Self::Store,
            ChangeEvent::Remove { .. } => Self::Remove,
            ChangeEvent::Update { .. } => Self::Update,
            ChangeEvent::Error { .. } => Self::Error,
            ChangeEvent::Other { .. } => Self::Other,
        }
    }
}

/// One handler slot per event kind, all defaulting to a no-op.
struct HandlerTable {
    store: EventHandler,
    remove: EventHandler,
    update: EventHandler,
    error: EventHandler,
    other: EventHandler,
}

impl HandlerTable {
    fn new() -> Self {
        let noop: EventHandler = Arc::new(|_| {});
        Self {
            store: noop.clone(),
            remove: noop.clone(),
            update: noop.clone(),
            error: noop.clone(),
            other: noop,
        }
    }

    fn slot(&self, kind: EventKind) -> &EventHandler {
        match kind {
            EventKind::Store => &self.store,
            EventKind::Remove => &self.remove,
            EventKind::Update => &self.update,
            EventKind::Error => &self.error,
            EventKind::Other => &self.other,
        }
    }

    fn slot_mut(&mut self, kind: EventKind) -> &mut EventHandler {
        match kind {
            EventKind::Store => &mut self.store,
            EventKind::Remove => &mut self.remove,
            EventKind::Update => &mut self.update,
            EventKind::Error => &mut self.error,
            EventKind::Other => &mut self.other,
        }
    }
}

/// Routes every incoming event to exactly one registered handler.
pub struct EventDispatcher {
    handlers: RwLock<HandlerTable>,
}

impl EventDispatcher {
    /// Creates a dispatcher with every slot set to a no-op.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HandlerTable::new()),
        }
    }

    /// Replaces the handler slot for an event kind.
    ///
    /// Replacement is atomic with respect to a concurrent dispatch: a
    /// dispatch already in flight keeps the handler it resolved.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> &Self
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        let mut table = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        *table.slot_mut(kind) = Arc::new(handler);
        self
    }

    /// Routes one event to the matching handler slot.
    ///
    /// A panicking handler is logged and isolated; it never disrupts the
    /// receive loop.
    pub fn dispatch(&self, event: ChangeEvent) {
        let kind = EventKind::of(&event);
        let handler = {
            let table = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            table.slot(kind).clone()
        };

        if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
            warn!(kind = ?kind, "Event handler panicked");
        }
    }

    /// Consumes wire payloads from a channel subscription until it closes.
    pub async fn run(&self, mut messages: broadcast::Receiver<String>) {
        loop {
            match messages.recv().await {
                Ok(payload) => {
                    let event = ChangeEvent::from_wire(&payload);
                    debug!(kind = ?EventKind::of(&event), "Dispatching event");
                    self.dispatch(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagging, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher").finish_non_exhaustive()
    }
}
