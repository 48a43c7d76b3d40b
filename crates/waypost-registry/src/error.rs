//! Error types for the registry.

use thiserror::Error;

/// Registry errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// `store` called on a record that already carries a registration id.
    #[error("record already registered: {0}")]
    AlreadyRegistered(String),

    /// A mutation was requested on a record without a registration id.
    #[error("no registration id in the record")]
    MissingRegistration,

    /// No entry with the given registration id.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Valkey/Redis pool error.
    #[error("valkey error: {0}")]
    Valkey(#[from] deadpool_redis::PoolError),

    /// Redis command error.
    #[error("redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Backend error.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
