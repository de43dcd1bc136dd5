//! Storage backend contract and implementations.
//!
//! The scheduler keeps all queue state in a backend offering hashes, sorted
//! sets, and plain sets with per-key atomic operations. No cross-key
//! transactions are assumed; the scheduler supplies its own critical section
//! where one is needed.

mod memory;
#[cfg(feature = "redis")]
mod redis_backend;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use fairshare_core::{StorageConfig, StorageKind};

use crate::error::StorageError;

pub use memory::MemoryBackend;
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;

/// Key/value, sorted-set, and set primitives the scheduler is built on.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Set one field of a hash.
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError>;

    /// Set several fields of a hash in one atomic step.
    async fn hash_set_many(&self, key: &str, fields: &[(String, String)]) -> Result<(), StorageError>;

    /// All fields of a hash. Empty when the hash does not exist.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StorageError>;

    /// Delete a hash. Returns whether it existed.
    async fn hash_delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Insert `member` with `score`, or overwrite the score of an existing member.
    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<(), StorageError>;

    /// The member with the lowest score. Equal scores resolve to the member
    /// that was inserted first.
    async fn sorted_set_peek_min(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Remove a member. Returns whether it was present.
    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, StorageError>;

    async fn sorted_set_len(&self, key: &str) -> Result<usize, StorageError>;

    /// Add a member. Returns whether it was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StorageError>;

    /// Remove a member. Returns whether it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StorageError>;

    async fn set_cardinality(&self, key: &str) -> Result<usize, StorageError>;

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StorageError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StorageError>;

    /// Drop every key.
    async fn flush_all(&self) -> Result<(), StorageError>;
}

/// Build the backend selected by config.
///
/// Returns an error when the Redis backend is requested but the crate was
/// built without the `redis` feature.
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>, StorageError> {
    match &config.kind {
        StorageKind::Memory => {
            info!("using in-memory storage backend");
            Ok(Arc::new(MemoryBackend::new()))
        }
        StorageKind::Redis { host, port } => connect_redis(host, *port).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(host: &str, port: u16) -> Result<Arc<dyn StorageBackend>, StorageError> {
    let backend = RedisBackend::connect(host, port).await?;
    info!(host = %host, port = port, "connected to redis storage backend");
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_host: &str, _port: u16) -> Result<Arc<dyn StorageBackend>, StorageError> {
    Err(StorageError::Unsupported(
        "Redis storage backend requires the 'redis' Cargo feature".into(),
    ))
}
