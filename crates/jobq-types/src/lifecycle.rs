//! Engine-side job lifecycle: ids, states, records, events, summaries.

use crate::{DriverKind, SubmissionError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Engine-assigned job identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// State of a job record in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepted, waiting for an admission slot.
    Pending,
    /// Handle obtained from the driver.
    Submitted,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Aborted)
    }

    /// Holds an admission slot.
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Submitted | JobState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Submitted => "submitted",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum JobError {
    #[error(transparent)]
    Submission(SubmissionError),
    #[error("backend reported the job as failed")]
    BackendFailed,
    #[error("backend lost track of the job")]
    BackendLost,
}

/// Engine-owned record of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub name: String,
    pub driver: DriverKind,
    pub state: JobState,
    /// Number of `submit` calls made for this job so far.
    pub submit_attempts: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_polled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl JobRecord {
    pub fn new(id: JobId, name: impl Into<String>, driver: DriverKind) -> Self {
        Self {
            id,
            name: name.into(),
            driver,
            state: JobState::Pending,
            submit_attempts: 0,
            created_at: Utc::now(),
            submitted_at: None,
            started_at: None,
            last_polled_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Time spent since the backend started the job, up to `finished_at` if done.
    /// `None` until the job has been observed running.
    pub fn runtime(&self) -> Option<Duration> {
        let start = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Utc::now);
        Some(end - start)
    }
}

/// One state transition, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub from: JobState,
    pub to: JobState,
    pub at: DateTime<Utc>,
}

/// Counts of records per state, plus admission settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub pending: usize,
    pub submitted: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub aborted: usize,
    /// 0 means unlimited.
    pub max_running: usize,
    pub paused: bool,
}

impl QueueSummary {
    pub fn active(&self) -> usize {
        self.submitted + self.running
    }

    pub fn complete(&self) -> usize {
        self.succeeded + self.failed + self.aborted
    }
}
