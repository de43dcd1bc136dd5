//! Priority-ordered pending queue.
//!
//! Stored as a sorted set of job ids scored by the negated priority, so the
//! backend's peek-min returns the highest-priority job.

use std::sync::Arc;

use crate::error::StorageError;
use crate::job::JobId;
use crate::store::StorageBackend;

pub(crate) const PENDING_KEY: &str = "pending_queue";

#[derive(Clone)]
pub struct PendingQueue {
    backend: Arc<dyn StorageBackend>,
}

impl PendingQueue {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Insert `id`, or re-prioritise it if already queued.
    pub async fn insert(&self, id: &JobId, priority: f64) -> Result<(), StorageError> {
        self.backend
            .sorted_set_add(PENDING_KEY, id.as_str(), -priority)
            .await
    }

    /// The highest-priority job without removing it.
    pub async fn peek(&self) -> Result<Option<JobId>, StorageError> {
        Ok(self
            .backend
            .sorted_set_peek_min(PENDING_KEY)
            .await?
            .map(JobId::from_stored))
    }

    pub async fn remove(&self, id: &JobId) -> Result<bool, StorageError> {
        self.backend.sorted_set_remove(PENDING_KEY, id.as_str()).await
    }

    pub async fn len(&self) -> Result<usize, StorageError> {
        self.backend.sorted_set_len(PENDING_KEY).await
    }
}
