//! Scheduler core: admission-controlled movement of jobs from pending to
//! running to complete.
//!
//! All queue state lives in the storage backend. The scheduler owns the only
//! cross-key critical section, `dispatch_lock`, which serialises every
//! dequeue so that no job is handed out twice. Submissions and completions of
//! running jobs do not take it; they serialise per job id on a striped lock
//! instead, so a completion can never delete the record of a resubmission
//! that raced it. Lock order is id stripe, then `dispatch_lock`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::futures::Notified;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use fairshare_core::SchedulerConfig;

use crate::error::{SchedulerError, StorageError};
use crate::job::{fairness_priority, Job, JobId, JobKey, JobSpec};
use crate::job_store::JobStore;
use crate::pending::PendingQueue;
use crate::registry::RunningRegistry;
use crate::store::StorageBackend;

const ID_LOCK_STRIPES: usize = 64;

/// Point-in-time queue depth, for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub pending: usize,
    pub running: usize,
    pub maximum: usize,
}

pub struct Scheduler {
    backend: Arc<dyn StorageBackend>,
    jobs: JobStore,
    pending: PendingQueue,
    running: RunningRegistry,
    maximum: usize,
    dispatch_lock: Mutex<()>,
    id_locks: Vec<Mutex<()>>,
    wake: Notify,
}

impl Scheduler {
    pub fn new(backend: Arc<dyn StorageBackend>, maximum: usize) -> Self {
        Self {
            jobs: JobStore::new(backend.clone()),
            pending: PendingQueue::new(backend.clone()),
            running: RunningRegistry::new(backend.clone()),
            backend,
            maximum,
            dispatch_lock: Mutex::new(()),
            id_locks: (0..ID_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            wake: Notify::new(),
        }
    }

    pub fn from_config(backend: Arc<dyn StorageBackend>, config: &SchedulerConfig) -> Self {
        Self::new(backend, config.maximum)
    }

    pub fn maximum(&self) -> usize {
        self.maximum
    }

    /// Lock shared by every submit, completion and lease release of `id`.
    fn id_lock(&self, id: &JobId) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        &self.id_locks[hasher.finish() as usize % self.id_locks.len()]
    }

    /// Resolves when a submission or completion may have made a job
    /// dispatchable. A signal sent while nobody waits is kept for the next
    /// waiter.
    pub fn notified(&self) -> Notified<'_> {
        self.wake.notified()
    }

    /// Queue a job. Resubmitting the same `(channel, project, build, command)`
    /// re-prioritises the pending entry instead of adding a second one.
    pub async fn submit(&self, spec: JobSpec) -> Result<JobId, SchedulerError> {
        spec.validate()?;
        let id = spec.id();
        let _id_guard = self.id_lock(&id).lock().await;

        if self.running.contains(&id).await? {
            return Err(SchedulerError::AlreadyRunning(id));
        }

        let owner_running = self.running.owner_count(&spec.owner).await?;
        let project_running = self.running.project_count(&spec.project).await?;
        let priority = fairness_priority(owner_running, project_running);

        let job = Job::new(spec, priority);
        self.jobs.put(&job).await?;
        self.pending.insert(&id, priority).await?;

        info!(
            job_id = %id,
            owner = %job.spec.owner,
            project = %job.spec.project,
            priority,
            "job queued"
        );
        self.wake.notify_one();
        Ok(id)
    }

    /// Dequeue the highest-priority job if the cap allows.
    ///
    /// Returns `Ok(None)` when `CURRENT >= MAXIMUM` or nothing is pending.
    /// A backend failure leaves the job pending.
    pub async fn next(&self) -> Result<Option<Job>, SchedulerError> {
        let _guard = self.dispatch_lock.lock().await;

        loop {
            let current = self.running.total().await?;
            if current >= self.maximum {
                debug!(current, maximum = self.maximum, "at capacity");
                return Ok(None);
            }

            let Some(id) = self.pending.peek().await? else {
                return Ok(None);
            };

            let mut job = match self.jobs.get(&id).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    warn!(job_id = %id, "pending entry has no job record, dropping");
                    self.pending.remove(&id).await?;
                    continue;
                }
                Err(StorageError::Corrupt { key, reason }) => {
                    warn!(job_id = %id, key = %key, reason = %reason, "dropping corrupt job record");
                    self.pending.remove(&id).await?;
                    self.jobs.delete(&id).await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if self.running.contains(&id).await? {
                warn!(job_id = %id, "pending entry is already running, dropping duplicate");
                self.pending.remove(&id).await?;
                continue;
            }

            self.pending.remove(&id).await?;
            let dispatched_at = Utc::now();
            job.dispatched_at = Some(dispatched_at);

            if let Err(e) = self.admit(&job).await {
                self.requeue(&job).await;
                return Err(e.into());
            }

            info!(
                job_id = %id,
                channel = %job.channel(),
                running = current + 1,
                maximum = self.maximum,
                "job dispatched"
            );
            return Ok(Some(job));
        }
    }

    async fn admit(&self, job: &Job) -> Result<(), StorageError> {
        self.running.insert(job).await?;
        self.jobs
            .mark_dispatched(&job.id, job.dispatched_at.unwrap_or_else(Utc::now))
            .await
    }

    /// Undo a half-finished admission so the job is pending again.
    async fn requeue(&self, job: &Job) {
        if let Err(e) = self
            .running
            .remove(&job.id, &job.spec.owner, &job.spec.project)
            .await
        {
            warn!(job_id = %job.id, error = %e, "failed to roll back running entry");
        }
        match self.pending.insert(&job.id, job.priority).await {
            Ok(()) => warn!(job_id = %job.id, "admission failed, job returned to pending"),
            Err(e) => warn!(job_id = %job.id, error = %e, "admission failed and job could not be requeued"),
        }
    }

    /// Mark the job identified by `key` complete and free its slot.
    ///
    /// Returns `Ok(false)` if no such job exists; repeated completions are
    /// harmless. A job completed while still pending is withdrawn.
    pub async fn complete(&self, key: &JobKey) -> Result<bool, SchedulerError> {
        let id = key.id();
        let _id_guard = self.id_lock(&id).lock().await;

        if self.running.contains(&id).await? {
            return self.release(&id).await;
        }

        // Settle against the dispatcher so the job cannot be admitted after
        // its record is deleted.
        let _guard = self.dispatch_lock.lock().await;
        if self.running.contains(&id).await? {
            return self.release(&id).await;
        }
        if self.pending.remove(&id).await? {
            self.jobs.delete(&id).await?;
            info!(job_id = %id, "job withdrawn before dispatch");
            return Ok(true);
        }
        self.release(&id).await
    }

    /// Free the running slot of `id` and delete its record. Caller holds the
    /// id lock. Returns whether a running entry was released.
    async fn release(&self, id: &JobId) -> Result<bool, SchedulerError> {
        let job = match self.jobs.get(id).await {
            Ok(job) => job,
            Err(StorageError::Corrupt { reason, .. }) => {
                warn!(job_id = %id, reason = %reason, "completing job with corrupt record");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let Some(job) = job else {
            let released = self.running.remove_orphan(id).await?;
            if released {
                warn!(job_id = %id, "released running entry without job record");
                self.wake.notify_one();
            } else {
                warn!(job_id = %id, "{}", SchedulerError::NotFound(id.clone()));
            }
            self.jobs.delete(id).await?;
            return Ok(released);
        };

        let was_running = self
            .running
            .remove(id, &job.spec.owner, &job.spec.project)
            .await?;
        self.jobs.delete(id).await?;

        if was_running {
            info!(job_id = %id, "job completed");
            self.wake.notify_one();
        } else {
            warn!(job_id = %id, "{}", SchedulerError::NotFound(id.clone()));
        }
        Ok(was_running)
    }

    /// Release running jobs dispatched more than `lease` ago.
    ///
    /// Returns the ids that were released.
    pub async fn expire_leases(&self, lease: Duration) -> Result<Vec<JobId>, SchedulerError> {
        let now = Utc::now();
        let mut expired = Vec::new();

        for id in self.running.members().await? {
            let overdue = match self.jobs.get(&id).await {
                // No dispatch stamp yet: admission is still in flight.
                Ok(Some(job)) => job
                    .dispatched_at
                    .is_some_and(|at| (now - at).to_std().is_ok_and(|age| age >= lease)),
                // Running without a usable record: nothing will ever complete it.
                Ok(None) | Err(StorageError::Corrupt { .. }) => true,
                Err(e) => return Err(e.into()),
            };
            if !overdue {
                continue;
            }
            let _id_guard = self.id_lock(&id).lock().await;
            // Completed while we were looking.
            if !self.running.contains(&id).await? {
                continue;
            }
            warn!(job_id = %id, lease_secs = lease.as_secs(), "lease expired, releasing job");
            if self.release(&id).await? {
                expired.push(id);
            }
        }

        Ok(expired)
    }

    /// Drop every pending, running, and stored job.
    pub async fn flush(&self) -> Result<(), SchedulerError> {
        let _guard = self.dispatch_lock.lock().await;
        self.backend.flush_all().await?;
        info!("scheduler state flushed");
        Ok(())
    }

    pub async fn stats(&self) -> Result<SchedulerStats, SchedulerError> {
        Ok(SchedulerStats {
            pending: self.pending.len().await?,
            running: self.running.total().await?,
            maximum: self.maximum,
        })
    }
}
