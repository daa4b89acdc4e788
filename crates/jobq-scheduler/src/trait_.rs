//! Scheduler trait: submit, cancel, query, and advance jobs.

use async_trait::async_trait;
use jobq_types::{JobId, JobState, WorkDescriptor};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),
}

/// Outcome of one poll tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// `get_status` calls answered within the driver timeout.
    pub polled: usize,
    /// State transitions caused by status observations.
    pub transitions: usize,
    /// Pending jobs handed to a driver by admission.
    pub admitted: usize,
}

/// Job scheduling engine.
///
/// Contract: `submit_job` always accepts; backend submission failures surface later
/// as a `Failed` job. `cancel_job` and `job_status` return `JobNotFound` for unknown
/// ids; `cancel_job` also does for jobs already in a terminal state. The engine never
/// polls on its own: callers drive `poll_tick`.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Queue a job and run admission; returns the new job id.
    async fn submit_job(&self, work: WorkDescriptor) -> Result<JobId, SchedulerError>;

    /// Cancel a pending or in-flight job.
    async fn cancel_job(&self, job_id: JobId) -> Result<(), SchedulerError>;

    /// Current state; terminal states stay visible until reaped.
    async fn job_status(&self, job_id: JobId) -> Result<JobState, SchedulerError>;

    /// One round of status queries over active jobs, followed by admission.
    async fn poll_tick(&self) -> Result<TickReport, SchedulerError>;
}
