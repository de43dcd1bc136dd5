//! Redis storage backend (requires the `redis` feature).
//!
//! Hashes, sets, and sorted sets map directly onto Redis types. Redis breaks
//! score ties lexicographically, so each sorted set carries a companion hash
//! `{key}:seq` recording the first-insertion sequence of every member; peek
//! resolves ties with it.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::debug;

use super::StorageBackend;
use crate::error::StorageError;

pub struct RedisBackend {
    conn: MultiplexedConnection,
}

impl From<redis::RedisError> for StorageError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
            StorageError::Connection(e.to_string())
        } else {
            StorageError::Command(e.to_string())
        }
    }
}

fn seq_key(key: &str) -> String {
    format!("{key}:seq")
}

fn counter_key(key: &str) -> String {
    format!("{key}:counter")
}

impl RedisBackend {
    pub async fn connect(host: &str, port: u16) -> Result<Self, StorageError> {
        let client = redis::Client::open(format!("redis://{host}:{port}/"))?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }

    /// Multiplexed connections are cheap handles onto one socket.
    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl StorageBackend for RedisBackend {
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        let _: () = self.conn().hset(key, field, value).await?;
        Ok(())
    }

    async fn hash_set_many(&self, key: &str, fields: &[(String, String)]) -> Result<(), StorageError> {
        if fields.is_empty() {
            return Ok(());
        }
        let _: () = self.conn().hset_multiple(key, fields).await?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        Ok(self.conn().hgetall(key).await?)
    }

    async fn hash_delete(&self, key: &str) -> Result<bool, StorageError> {
        let removed: i64 = self.conn().del(key).await?;
        Ok(removed > 0)
    }

    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<(), StorageError> {
        let mut conn = self.conn();
        let seq: i64 = conn.incr(counter_key(key), 1).await?;
        let _: bool = conn.hset_nx(seq_key(key), member, seq).await?;
        let _: i64 = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn sorted_set_peek_min(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.conn();
        let head: Vec<(String, f64)> = conn.zrange_withscores(key, 0, 0).await?;
        let Some((first, score)) = head.into_iter().next() else {
            return Ok(None);
        };

        let tied: Vec<String> = conn.zrangebyscore(key, score, score).await?;
        if tied.len() <= 1 {
            return Ok(Some(first));
        }

        let seqs: Vec<Option<i64>> = redis::cmd("HMGET")
            .arg(seq_key(key))
            .arg(&tied)
            .query_async(&mut conn)
            .await?;
        debug!(key = %key, tied = tied.len(), "resolving sorted set tie by insertion order");

        Ok(tied
            .into_iter()
            .zip(seqs)
            .min_by_key(|(_, seq)| seq.unwrap_or(i64::MAX))
            .map(|(member, _)| member))
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        let mut conn = self.conn();
        let removed: i64 = conn.zrem(key, member).await?;
        let _: i64 = conn.hdel(seq_key(key), member).await?;
        Ok(removed > 0)
    }

    async fn sorted_set_len(&self, key: &str) -> Result<usize, StorageError> {
        Ok(self.conn().zcard(key).await?)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        let added: i64 = self.conn().sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        let removed: i64 = self.conn().srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn set_cardinality(&self, key: &str) -> Result<usize, StorageError> {
        Ok(self.conn().scard(key).await?)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        Ok(self.conn().sismember(key, member).await?)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StorageError> {
        Ok(self.conn().smembers(key).await?)
    }

    async fn flush_all(&self) -> Result<(), StorageError> {
        let _: () = redis::cmd("FLUSHDB").query_async(&mut self.conn()).await?;
        Ok(())
    }
}
