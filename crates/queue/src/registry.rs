//! Running registry: the running set viewed by owner, by project, and globally.
//!
//! The global view is authoritative. Its cardinality is the running count
//! used for admission, so the count can never drift from the set or go
//! negative.

use std::sync::Arc;

use crate::error::StorageError;
use crate::job::{Job, JobId};
use crate::store::StorageBackend;

pub(crate) const RUNNING_KEY: &str = "running_queue";

fn owner_key(owner: &str) -> String {
    format!("running:owner:{owner}")
}

fn project_key(project: &str) -> String {
    format!("running:project:{project}")
}

#[derive(Clone)]
pub struct RunningRegistry {
    backend: Arc<dyn StorageBackend>,
}

impl RunningRegistry {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Record `job` as running in all three views.
    ///
    /// The global view is written last so a job never counts as running
    /// while its owner/project views are incomplete.
    pub async fn insert(&self, job: &Job) -> Result<(), StorageError> {
        let id = job.id.as_str();
        self.backend.set_add(&owner_key(&job.spec.owner), id).await?;
        self.backend.set_add(&project_key(&job.spec.project), id).await?;
        self.backend.set_add(RUNNING_KEY, id).await?;
        Ok(())
    }

    /// Drop `id` from every view. Returns whether it was globally running.
    /// Views the id is absent from are left untouched.
    pub async fn remove(&self, id: &JobId, owner: &str, project: &str) -> Result<bool, StorageError> {
        let was_running = self.backend.set_remove(RUNNING_KEY, id.as_str()).await?;
        self.backend.set_remove(&owner_key(owner), id.as_str()).await?;
        self.backend.set_remove(&project_key(project), id.as_str()).await?;
        Ok(was_running)
    }

    /// Drop `id` from the global view only, for entries whose record is gone.
    pub async fn remove_orphan(&self, id: &JobId) -> Result<bool, StorageError> {
        self.backend.set_remove(RUNNING_KEY, id.as_str()).await
    }

    pub async fn contains(&self, id: &JobId) -> Result<bool, StorageError> {
        self.backend.set_contains(RUNNING_KEY, id.as_str()).await
    }

    /// Global running count (`CURRENT`).
    pub async fn total(&self) -> Result<usize, StorageError> {
        self.backend.set_cardinality(RUNNING_KEY).await
    }

    pub async fn owner_count(&self, owner: &str) -> Result<usize, StorageError> {
        self.backend.set_cardinality(&owner_key(owner)).await
    }

    pub async fn project_count(&self, project: &str) -> Result<usize, StorageError> {
        self.backend.set_cardinality(&project_key(project)).await
    }

    pub async fn members(&self) -> Result<Vec<JobId>, StorageError> {
        Ok(self
            .backend
            .set_members(RUNNING_KEY)
            .await?
            .into_iter()
            .map(JobId::from_stored)
            .collect())
    }
}
