//! Config Store client for the cluster membership service.
//!
//! The cluster daemon exposes a flat key-value config database over HTTP.
//! Everything Helmsman persists — provisioning variable sets, upgrade state,
//! the deployment manifest — lives under flat string keys here. This crate
//! provides the `ConfigStore` trait, an HTTP backend for the real daemon, an
//! in-memory backend for tests, and typed JSON helpers on top of the raw
//! byte interface.
//!
//! A missing key (`NotFound`) and an unreachable daemon (`Unavailable`) are
//! distinct errors everywhere: callers routinely recover from the former and
//! never from the latter.

pub mod config;
pub mod http;
pub mod memory;

pub use config::{delete_config, read_config, update_config};
pub use http::HttpStore;
pub use memory::MemoryStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("config key not found: {0}")]
    NotFound(String),
    #[error("cluster service unavailable: {0}")]
    Unavailable(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyed access to the persisted configuration database.
///
/// Writes are whole-value overwrites; there is no partial update and no
/// cross-process locking. Callers serialize concurrent writers externally.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Vec<u8>, ClusterError>;

    fn put(&self, key: &str, value: &[u8]) -> Result<(), ClusterError>;

    /// Delete a key. Fails with `NotFound` when the key is absent.
    fn delete(&self, key: &str) -> Result<(), ClusterError>;
}
