//! Record and change-event types shared across the registry.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One registered service endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Registration id, assigned on first successful store and immutable
    /// for the record's lifetime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<String>,

    /// Service name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Network address, e.g. `127.0.0.1:9091`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,

    /// Service type tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Record {
    /// Creates an unregistered record.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            registration: None,
            name: name.into(),
            address: address.into(),
            kind: None,
            metadata: Map::new(),
        }
    }

    /// Creates a minimal record carrying only a registration id.
    ///
    /// Used for `remove` results and events, where only the id of the
    /// departed entry is still known.
    pub fn from_registration(id: impl Into<String>) -> Self {
        Self {
            registration: Some(id.into()),
            name: String::new(),
            address: String::new(),
            kind: None,
            metadata: Map::new(),
        }
    }

    /// Sets the service type tag.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// The mutating operation a failure occurred in.
///
/// Serialized as the `when` field of an error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Failure during `store`.
    Store,
    /// Failure during `remove`.
    Remove,
    /// Failure during `update`.
    Update,
}

/// A change event carried on the notification channel.
///
/// The wire discriminator is an open string space; it is converted to this
/// closed enum exactly once, at [`ChangeEvent::from_wire`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A record was stored.
    Store {
        /// The stored record, registration id assigned.
        record: Record,
    },
    /// A record was removed.
    Remove {
        /// Minimal record carrying the removed registration id.
        record: Record,
    },
    /// A record was updated in place.
    Update {
        /// The record's current payload.
        record: Record,
    },
    /// A mutation against the shared collection failed.
    Error {
        /// Human-readable failure description.
        error: String,
        /// The operation that failed.
        when: Operation,
    },
    /// Anything with an unrecognized or malformed action discriminator.
    Other {
        /// The raw document as received.
        raw: Value,
    },
}

impl ChangeEvent {
    /// Encodes the event into its wire document.
    pub fn to_wire(&self) -> String {
        let doc = match self {
            Self::Store { record } => json!({ "action": "store", "record": record }),
            Self::Remove { record } => json!({ "action": "remove", "record": record }),
            Self::Update { record } => json!({ "action": "update", "record": record }),
            Self::Error { error, when } => {
                json!({ "action": "error", "error": error, "when": when })
            }
            Self::Other { raw } => raw.clone(),
        };
        doc.to_string()
    }

    /// Decodes a wire payload, classifying it by its `action` discriminator.
    ///
    /// Classification is total: unknown actions, missing or malformed
    /// fields, and non-JSON payloads all map to [`ChangeEvent::Other`].
    pub fn from_wire(payload: &str) -> Self {
        let raw: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(_) => {
                return Self::Other {
                    raw: Value::String(payload.to_owned()),
                }
            }
        };

        match raw.get("action").and_then(Value::as_str) {
            Some("store") => Self::record_event(raw, |record| Self::Store { record }),
            Some("remove") => Self::record_event(raw, |record| Self::Remove { record }),
            Some("update") => Self::record_event(raw, |record| Self::Update { record }),
            Some("error") => {
                let error = raw
                    .get("error")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                let when = raw
                    .get("when")
                    .and_then(|w| serde_json::from_value(w.clone()).ok());
                match (error, when) {
                    (Some(error), Some(when)) => Self::Error { error, when },
                    _ => Self::Other { raw },
                }
            }
            _ => Self::Other { raw },
        }
    }

    fn record_event(raw: Value, make: impl FnOnce(Record) -> Self) -> Self {
        match raw.get("record").cloned().map(serde_json::from_value) {
            Some(Ok(record)) => make(record),
            _ => Self::Other { raw },
        }
    }
}
