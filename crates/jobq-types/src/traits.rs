//! Driver capability trait and the handles that flow through it.

use crate::WorkDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Type tag of a backend family ("local", "scripted", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverKind(String);

impl DriverKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DriverKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Status reported by a backend for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The backend has no record of the job.
    NotFound,
    /// Accepted by the backend, not yet executing.
    Waiting,
    Running,
    Success,
    Failed,
}

/// Backend-side identity of one submitted job.
///
/// The token is an index into state private to the driver that issued the handle;
/// the engine only stores it and passes it back. `clean` and `abort` consume the
/// handle, so a released job cannot be addressed again.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct JobHandle {
    kind: DriverKind,
    token: u64,
}

impl JobHandle {
    pub fn new(kind: DriverKind, token: u64) -> Self {
        Self { kind, token }
    }

    pub fn kind(&self) -> &DriverKind {
        &self.kind
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    /// Panics when the handle was issued by a different backend family.
    ///
    /// Dispatching a handle to the wrong driver would run one backend's resource
    /// management on another backend's job, so this is not recoverable.
    pub fn assert_kind(&self, expected: &DriverKind) {
        if &self.kind != expected {
            panic!(
                "internal error - cast failed: job handle of kind `{}` dispatched to driver `{}`",
                self.kind, expected
            );
        }
    }
}

/// Backend refused or failed to start a job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SubmissionError {
    #[error("submission rejected: {0}")]
    Rejected(String),
    #[error("failed to spawn job: {0}")]
    Spawn(String),
    #[error("no driver registered for kind `{0}`")]
    UnknownDriver(DriverKind),
    #[error("submission timed out")]
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("driver error: {0}")]
    Other(String),
}

/// Capability set every queue backend implements.
///
/// All operations must return promptly; long-running work belongs to the backend
/// itself. Backend failures are reported through return values, never panics.
#[async_trait]
pub trait QueueDriver: Send + Sync {
    /// Backend family of this driver; stamped on every handle it issues.
    fn kind(&self) -> DriverKind;

    /// Start one unit of work, returning the handle that tracks it.
    async fn submit(&self, work: &WorkDescriptor) -> Result<JobHandle, SubmissionError>;

    /// Release all backend resources of a finished job.
    async fn clean(&self, job: JobHandle) -> Result<(), DriverError>;

    /// Best-effort cancellation of an in-flight job. Resources are released eventually.
    async fn abort(&self, job: JobHandle) -> Result<(), DriverError>;

    /// Cheap, repeatable status poll.
    async fn get_status(&self, job: &JobHandle) -> JobStatus;
}

/// Shared, kind-checked reference to a registered driver.
#[derive(Clone)]
pub struct DriverHandle {
    kind: DriverKind,
    driver: Arc<dyn QueueDriver>,
}

impl DriverHandle {
    pub fn new(driver: Arc<dyn QueueDriver>) -> Self {
        Self {
            kind: driver.kind(),
            driver,
        }
    }

    pub fn kind(&self) -> &DriverKind {
        &self.kind
    }

    /// Access the driver, panicking when it is not of the `expected` family.
    pub fn expect_kind(&self, expected: &DriverKind) -> &dyn QueueDriver {
        if &self.kind != expected {
            panic!(
                "internal error - cast failed: driver `{}` used where `{}` was expected",
                self.kind, expected
            );
        }
        self.driver.as_ref()
    }

    pub async fn submit(&self, work: &WorkDescriptor) -> Result<JobHandle, SubmissionError> {
        let handle = self.driver.submit(work).await?;
        handle.assert_kind(&self.kind);
        Ok(handle)
    }

    pub async fn clean(&self, job: JobHandle) -> Result<(), DriverError> {
        self.expect_kind(job.kind()).clean(job).await
    }

    pub async fn abort(&self, job: JobHandle) -> Result<(), DriverError> {
        self.expect_kind(job.kind()).abort(job).await
    }

    pub async fn get_status(&self, job: &JobHandle) -> JobStatus {
        self.expect_kind(job.kind()).get_status(job).await
    }
}

impl std::fmt::Debug for DriverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverHandle")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
