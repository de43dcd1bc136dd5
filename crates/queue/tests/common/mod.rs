//! Memory backend with switches for simulating outages and for pausing an
//! operation mid-flight.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use fairshare_queue::{MemoryBackend, StorageBackend, StorageError};

pub struct TestBackend {
    inner: MemoryBackend,
    sets_down: AtomicBool,
    calls: Mutex<HashMap<&'static str, usize>>,
    hold_delete: AtomicBool,
    delete_held: Notify,
    delete_release: Semaphore,
}

impl TestBackend {
    pub fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            sets_down: AtomicBool::new(false),
            calls: Mutex::new(HashMap::new()),
            hold_delete: AtomicBool::new(false),
            delete_held: Notify::new(),
            delete_release: Semaphore::new(0),
        }
    }

    /// Make every `set_add` fail until switched back.
    pub fn set_writes_down(&self, down: bool) {
        self.sets_down.store(down, Ordering::SeqCst);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Pause the next `hash_delete` until [`release_delete`] is called.
    ///
    /// [`release_delete`]: TestBackend::release_delete
    pub fn hold_next_delete(&self) {
        self.hold_delete.store(true, Ordering::SeqCst);
    }

    /// Resolves once a held `hash_delete` is waiting.
    pub async fn delete_held(&self) {
        self.delete_held.notified().await;
    }

    pub fn release_delete(&self) {
        self.delete_release.add_permits(1);
    }

    fn record(&self, op: &'static str) {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
    }
}

#[async_trait]
impl StorageBackend for TestBackend {
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        self.inner.hash_set(key, field, value).await
    }
    async fn hash_set_many(&self, key: &str, fields: &[(String, String)]) -> Result<(), StorageError> {
        self.inner.hash_set_many(key, fields).await
    }
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        self.inner.hash_get_all(key).await
    }
    async fn hash_delete(&self, key: &str) -> Result<bool, StorageError> {
        if self.hold_delete.swap(false, Ordering::SeqCst) {
            self.delete_held.notify_one();
            if let Ok(permit) = self.delete_release.acquire().await {
                permit.forget();
            }
        }
        self.inner.hash_delete(key).await
    }
    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<(), StorageError> {
        self.inner.sorted_set_add(key, member, score).await
    }
    async fn sorted_set_peek_min(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.sorted_set_peek_min(key).await
    }
    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        self.inner.sorted_set_remove(key, member).await
    }
    async fn sorted_set_len(&self, key: &str) -> Result<usize, StorageError> {
        self.inner.sorted_set_len(key).await
    }
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        self.record("set_add");
        if self.sets_down.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("set_add: backend offline".into()));
        }
        self.inner.set_add(key, member).await
    }
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        self.inner.set_remove(key, member).await
    }
    async fn set_cardinality(&self, key: &str) -> Result<usize, StorageError> {
        self.inner.set_cardinality(key).await
    }
    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        self.inner.set_contains(key, member).await
    }
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StorageError> {
        self.inner.set_members(key).await
    }
    async fn flush_all(&self) -> Result<(), StorageError> {
        self.inner.flush_all().await
    }
}
