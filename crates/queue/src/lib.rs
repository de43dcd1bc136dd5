pub mod dispatch;
pub mod error;
pub mod job;
pub mod job_store;
pub mod pending;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use dispatch::{Dispatcher, JobPublisher};
pub use error::{PublishError, SchedulerError, StorageError};
pub use job::{fairness_priority, Job, JobId, JobKey, JobSpec};
pub use scheduler::{Scheduler, SchedulerStats};
pub use store::{connect, MemoryBackend, StorageBackend};
