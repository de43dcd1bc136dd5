//! Dispatch loop: releases admissible jobs to their channels.
//!
//! The loop wakes on a fixed tick or when the scheduler signals that a job
//! was submitted or completed. Each wake drains the queue while capacity
//! remains, so one wake may dispatch several jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use fairshare_core::SchedulerConfig;

use crate::error::PublishError;
use crate::scheduler::Scheduler;

/// Delivers a dispatched job to whoever listens on its channel.
///
/// The scheduler never sees connections; it only emits "job ready for
/// channel X".
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Publish `payload` to every subscriber of `channel`. Returns how many
    /// subscribers it was handed to.
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, PublishError>;
}

/// Blanket implementation so `Arc<dyn JobPublisher>` can be used directly.
#[async_trait]
impl<T: JobPublisher + ?Sized> JobPublisher for Arc<T> {
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, PublishError> {
        (**self).publish(channel, payload).await
    }
}

pub struct Dispatcher {
    scheduler: Arc<Scheduler>,
    publisher: Arc<dyn JobPublisher>,
    tick: Duration,
    lease: Option<Duration>,
}

impl Dispatcher {
    pub fn new(scheduler: Arc<Scheduler>, publisher: Arc<dyn JobPublisher>, tick: Duration) -> Self {
        Self {
            scheduler,
            publisher,
            tick,
            lease: None,
        }
    }

    pub fn from_config(
        scheduler: Arc<Scheduler>,
        publisher: Arc<dyn JobPublisher>,
        config: &SchedulerConfig,
    ) -> Self {
        let mut dispatcher = Self::new(scheduler, publisher, config.tick);
        dispatcher.lease = config.lease;
        dispatcher
    }

    /// Release running jobs older than `lease` on every tick.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Dispatch jobs until the cap is reached or nothing is pending.
    ///
    /// Backend errors end the drain early; whatever is still pending is
    /// retried on the next wake.
    pub async fn drain(&self) -> usize {
        let mut dispatched = 0;
        loop {
            let job = match self.scheduler.next().await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "dispatch cycle aborted");
                    break;
                }
            };

            let payload = match serde_json::to_string(&job.payload()) {
                Ok(p) => p,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "failed to encode dispatch payload");
                    continue;
                }
            };

            match self.publisher.publish(job.channel(), payload).await {
                Ok(0) => warn!(
                    job_id = %job.id,
                    channel = %job.channel(),
                    "no subscribers on channel, job stays running"
                ),
                Ok(receivers) => debug!(job_id = %job.id, receivers, "job published"),
                Err(e) => warn!(job_id = %job.id, error = %e, "publish failed, job stays running"),
            }
            dispatched += 1;
        }
        dispatched
    }

    async fn expire_leases(&self) {
        let Some(lease) = self.lease else {
            return;
        };
        match self.scheduler.expire_leases(lease).await {
            Ok(expired) if !expired.is_empty() => {
                info!(count = expired.len(), "released jobs with expired leases")
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "lease sweep failed"),
        }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tick_ms = self.tick.as_millis() as u64,
            maximum = self.scheduler.maximum(),
            lease = ?self.lease,
            "dispatcher started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => self.expire_leases().await,
                _ = self.scheduler.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }

            let dispatched = self.drain().await;
            if dispatched > 0 {
                debug!(dispatched, "dispatch wake complete");
            }
        }

        info!("dispatcher stopped");
    }
}
