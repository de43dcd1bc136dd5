//! Job records keyed by [`JobId`].

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::job::{Job, JobId};
use crate::store::StorageBackend;

const DISPATCHED_AT: &str = "dispatched_at";

#[derive(Clone)]
pub struct JobStore {
    backend: Arc<dyn StorageBackend>,
}

impl JobStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Write every field of `job`, overwriting fields of an existing record.
    pub async fn put(&self, job: &Job) -> Result<(), StorageError> {
        self.backend
            .hash_set_many(&job.id.storage_key(), &job.to_fields())
            .await
    }

    /// Load a job. `Ok(None)` when no record exists; `Err(Corrupt)` when the
    /// record cannot be parsed.
    pub async fn get(&self, id: &JobId) -> Result<Option<Job>, StorageError> {
        let fields = self.backend.hash_get_all(&id.storage_key()).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Job::from_fields(id.clone(), fields).map(Some)
    }

    pub async fn mark_dispatched(&self, id: &JobId, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.backend
            .hash_set(&id.storage_key(), DISPATCHED_AT, &at.to_rfc3339())
            .await
    }

    pub async fn delete(&self, id: &JobId) -> Result<bool, StorageError> {
        self.backend.hash_delete(&id.storage_key()).await
    }
}
