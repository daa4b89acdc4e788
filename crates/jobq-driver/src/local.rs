//! Local driver: every job is a child process of the coordinating process.

use jobq_types::{
    DriverError, DriverKind, JobHandle, JobStatus, QueueDriver, SubmissionError, WorkDescriptor,
};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

pub const LOCAL_KIND: &str = "local";

/// Runs each job as `command args...` in `run_path`, tracking children by token.
pub struct LocalDriver {
    kind: DriverKind,
    next_token: AtomicU64,
    children: Mutex<HashMap<u64, Child>>,
}

impl LocalDriver {
    pub fn new() -> Self {
        Self {
            kind: DriverKind::new(LOCAL_KIND),
            next_token: AtomicU64::new(1),
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Number of children still tracked (not yet cleaned or aborted).
    pub async fn tracked(&self) -> usize {
        self.children.lock().await.len()
    }
}

impl Default for LocalDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl QueueDriver for LocalDriver {
    fn kind(&self) -> DriverKind {
        self.kind.clone()
    }

    async fn submit(&self, work: &WorkDescriptor) -> Result<JobHandle, SubmissionError> {
        let mut cmd = Command::new(&work.command);
        cmd.args(&work.args)
            .envs(&work.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(ref dir) = work.run_path {
            cmd.current_dir(dir);
        }
        let child = cmd
            .spawn()
            .map_err(|e| SubmissionError::Spawn(format!("{}: {}", work.command, e)))?;
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(token, pid = ?child.id(), name = %work.name, "spawned local job");
        self.children.lock().await.insert(token, child);
        Ok(JobHandle::new(self.kind.clone(), token))
    }

    async fn clean(&self, job: JobHandle) -> Result<(), DriverError> {
        job.assert_kind(&self.kind);
        self.children.lock().await.remove(&job.token());
        Ok(())
    }

    async fn abort(&self, job: JobHandle) -> Result<(), DriverError> {
        job.assert_kind(&self.kind);
        let child = self.children.lock().await.remove(&job.token());
        let Some(mut child) = child else {
            return Ok(());
        };
        child
            .start_kill()
            .map_err(|e| DriverError::Other(format!("kill failed: {}", e)))?;
        // Reap in the background; teardown may finish after abort returns.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });
        Ok(())
    }

    async fn get_status(&self, job: &JobHandle) -> JobStatus {
        job.assert_kind(&self.kind);
        let mut guard = self.children.lock().await;
        let Some(child) = guard.get_mut(&job.token()) else {
            return JobStatus::NotFound;
        };
        match child.try_wait() {
            Ok(None) => JobStatus::Running,
            Ok(Some(status)) if status.success() => JobStatus::Success,
            Ok(Some(status)) => {
                tracing::debug!(token = job.token(), %status, "local job exited unsuccessfully");
                JobStatus::Failed
            }
            Err(e) => {
                tracing::warn!(token = job.token(), error = %e, "could not query local job");
                JobStatus::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_terminal(driver: &LocalDriver, job: &JobHandle) -> JobStatus {
        for _ in 0..200 {
            let status = driver.get_status(job).await;
            if status != JobStatus::Running {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("local job did not finish");
    }

    #[tokio::test]
    async fn exit_codes_map_to_success_and_failure() {
        let driver = LocalDriver::new();
        let ok = driver
            .submit(&WorkDescriptor::new("ok", "true"))
            .await
            .unwrap();
        let bad = driver
            .submit(&WorkDescriptor::new("bad", "false"))
            .await
            .unwrap();
        assert_ne!(ok.token(), bad.token());
        assert_eq!(wait_terminal(&driver, &ok).await, JobStatus::Success);
        assert_eq!(wait_terminal(&driver, &bad).await, JobStatus::Failed);

        driver.clean(ok).await.unwrap();
        driver.clean(bad).await.unwrap();
        assert_eq!(driver.tracked().await, 0);
    }

    #[tokio::test]
    async fn missing_command_is_a_submission_error() {
        let driver = LocalDriver::new();
        let err = driver
            .submit(&WorkDescriptor::new("x", "/nonexistent/jobq-test-binary"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Spawn(_)));
    }

    #[tokio::test]
    async fn aborted_job_is_no_longer_tracked() {
        let driver = LocalDriver::new();
        let job = driver
            .submit(&WorkDescriptor::new("sleeper", "sleep").with_args(["30"]))
            .await
            .unwrap();
        let copy = JobHandle::new(driver.kind(), job.token());
        assert_eq!(driver.get_status(&copy).await, JobStatus::Running);
        driver.abort(job).await.unwrap();
        assert_eq!(driver.get_status(&copy).await, JobStatus::NotFound);
    }

    #[tokio::test]
    #[should_panic(expected = "cast failed")]
    async fn rejects_handles_from_other_backends() {
        let driver = LocalDriver::new();
        let foreign = JobHandle::new(DriverKind::new("slurm"), 1);
        driver.get_status(&foreign).await;
    }
}
