//! Configuration types for the registry.

use serde::Deserialize;

/// Registry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Name of the shared collection within the store.
    pub key: String,
    /// Name of the notification channel.
    pub channel: String,
    /// Backend selection.
    pub backend: BackendConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            key: "records".to_owned(),
            channel: "default".to_owned(),
            backend: BackendConfig::default(),
        }
    }
}

/// Backend configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-process backend, not shared across processes.
    #[default]
    Memory,
    /// Shared Valkey/Redis backend.
    Valkey {
        /// Connection URL.
        ///
        /// Credentials go in the URL itself, e.g.
        /// `redis://:password@127.0.0.1:6379`.
        #[serde(default = "default_valkey_url")]
        url: String,
        /// Maximum pool connections.
        #[serde(default = "default_pool_size")]
        pool_size: usize,
    },
}

fn default_valkey_url() -> String {
    "redis://127.0.0.1:6379".to_owned()
}

fn default_pool_size() -> usize {
    10
}
