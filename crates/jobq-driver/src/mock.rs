//! Scripted driver for tests: statuses are set by the test, every call is counted.

use jobq_types::{
    DriverError, DriverKind, JobHandle, JobStatus, QueueDriver, SubmissionError, WorkDescriptor,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Call counters of a [`ScriptedDriver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverCalls {
    pub submits: usize,
    pub cleans: usize,
    pub aborts: usize,
    pub polls: usize,
}

/// Driver operation a test can make hang.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Op {
    Submit,
    Status,
    Clean,
    Abort,
}

#[derive(Default)]
struct Script {
    next_token: u64,
    /// token -> job name, for handles not yet cleaned or aborted.
    live: HashMap<u64, String>,
    statuses: HashMap<String, JobStatus>,
    submit_failures: HashMap<String, u32>,
    stalled: HashSet<(Op, String)>,
    calls: DriverCalls,
    cleaned: Vec<String>,
    aborted: Vec<String>,
}

impl Script {
    fn stalls(&self, op: Op, token: u64) -> bool {
        self.live
            .get(&token)
            .is_some_and(|name| self.stalled.contains(&(op, name.clone())))
    }
}

async fn hang() {
    tokio::time::sleep(Duration::from_secs(3600)).await;
}

/// In-memory driver whose job statuses are keyed by `WorkDescriptor::name`.
///
/// Jobs report `Waiting` until the test sets another status. Tokens released by
/// `clean`/`abort` report `NotFound` afterwards.
pub struct ScriptedDriver {
    kind: DriverKind,
    script: Mutex<Script>,
}

impl ScriptedDriver {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: DriverKind::new(kind),
            script: Mutex::new(Script::default()),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_status(&self, name: &str, status: JobStatus) {
        self.script().statuses.insert(name.to_string(), status);
    }

    /// Make the next `times` submissions of `name` fail.
    pub fn fail_submissions(&self, name: &str, times: u32) {
        self.script()
            .submit_failures
            .insert(name.to_string(), times);
    }

    /// Make submissions of `name` hang, for timeout tests.
    pub fn stall_submissions(&self, name: &str) {
        self.stall(Op::Submit, name);
    }

    /// Make status queries for `name` hang.
    pub fn stall_status(&self, name: &str) {
        self.stall(Op::Status, name);
    }

    /// Make `clean` of `name` hang; the handle stays live.
    pub fn stall_clean(&self, name: &str) {
        self.stall(Op::Clean, name);
    }

    /// Make `abort` of `name` hang; the handle stays live.
    pub fn stall_abort(&self, name: &str) {
        self.stall(Op::Abort, name);
    }

    fn stall(&self, op: Op, name: &str) {
        self.script().stalled.insert((op, name.to_string()));
    }

    pub fn calls(&self) -> DriverCalls {
        self.script().calls
    }

    /// Names of cleaned jobs, in call order.
    pub fn cleaned(&self) -> Vec<String> {
        self.script().cleaned.clone()
    }

    /// Names of aborted jobs, in call order.
    pub fn aborted(&self) -> Vec<String> {
        self.script().aborted.clone()
    }

    /// Handles issued and not yet released.
    pub fn live(&self) -> usize {
        self.script().live.len()
    }
}

#[async_trait::async_trait]
impl QueueDriver for ScriptedDriver {
    fn kind(&self) -> DriverKind {
        self.kind.clone()
    }

    async fn submit(&self, work: &WorkDescriptor) -> Result<JobHandle, SubmissionError> {
        let stalled = {
            let mut s = self.script();
            s.calls.submits += 1;
            s.stalled.contains(&(Op::Submit, work.name.clone()))
        };
        if stalled {
            hang().await;
        }
        let mut s = self.script();
        if let Some(left) = s.submit_failures.get_mut(&work.name) {
            if *left > 0 {
                *left -= 1;
                return Err(SubmissionError::Rejected(format!(
                    "scripted failure for {}",
                    work.name
                )));
            }
        }
        s.next_token += 1;
        let token = s.next_token;
        s.live.insert(token, work.name.clone());
        Ok(JobHandle::new(self.kind.clone(), token))
    }

    async fn clean(&self, job: JobHandle) -> Result<(), DriverError> {
        job.assert_kind(&self.kind);
        let stalled = {
            let mut s = self.script();
            s.calls.cleans += 1;
            s.stalls(Op::Clean, job.token())
        };
        if stalled {
            hang().await;
        }
        let mut s = self.script();
        let name = s
            .live
            .remove(&job.token())
            .ok_or_else(|| DriverError::Other(format!("unknown token {}", job.token())))?;
        s.cleaned.push(name);
        Ok(())
    }

    async fn abort(&self, job: JobHandle) -> Result<(), DriverError> {
        job.assert_kind(&self.kind);
        let stalled = {
            let mut s = self.script();
            s.calls.aborts += 1;
            s.stalls(Op::Abort, job.token())
        };
        if stalled {
            hang().await;
        }
        let mut s = self.script();
        let name = s
            .live
            .remove(&job.token())
            .ok_or_else(|| DriverError::Other(format!("unknown token {}", job.token())))?;
        s.aborted.push(name);
        Ok(())
    }

    async fn get_status(&self, job: &JobHandle) -> JobStatus {
        job.assert_kind(&self.kind);
        let stalled = {
            let mut s = self.script();
            s.calls.polls += 1;
            s.stalls(Op::Status, job.token())
        };
        if stalled {
            hang().await;
        }
        let s = self.script();
        match s.live.get(&job.token()) {
            Some(name) => s
                .statuses
                .get(name)
                .copied()
                .unwrap_or(JobStatus::Waiting),
            None => JobStatus::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_statuses_and_release() {
        let driver = ScriptedDriver::new("scripted");
        let job = driver
            .submit(&WorkDescriptor::new("a", "noop"))
            .await
            .unwrap();
        assert_eq!(driver.get_status(&job).await, JobStatus::Waiting);
        driver.set_status("a", JobStatus::Success);
        assert_eq!(driver.get_status(&job).await, JobStatus::Success);

        let released = JobHandle::new(driver.kind(), job.token());
        driver.clean(job).await.unwrap();
        assert_eq!(driver.get_status(&released).await, JobStatus::NotFound);
        assert_eq!(driver.cleaned(), vec!["a".to_string()]);
        assert_eq!(
            driver.calls(),
            DriverCalls {
                submits: 1,
                cleans: 1,
                aborts: 0,
                polls: 3
            }
        );
    }

    #[tokio::test]
    async fn scripted_submission_failures_run_out() {
        let driver = ScriptedDriver::new("scripted");
        driver.fail_submissions("b", 1);
        let work = WorkDescriptor::new("b", "noop");
        assert!(driver.submit(&work).await.is_err());
        assert!(driver.submit(&work).await.is_ok());
        assert_eq!(driver.live(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_operations_hang_and_keep_the_handle() {
        let driver = ScriptedDriver::new("scripted");
        driver.stall_status("c");
        driver.stall_clean("c");
        let job = driver
            .submit(&WorkDescriptor::new("c", "noop"))
            .await
            .unwrap();
        let limit = Duration::from_millis(50);
        assert!(tokio::time::timeout(limit, driver.get_status(&job))
            .await
            .is_err());
        assert!(tokio::time::timeout(limit, driver.clean(job))
            .await
            .is_err());
        assert_eq!(driver.live(), 1);
        assert!(driver.cleaned().is_empty());
        assert_eq!(driver.calls().polls, 1);
        assert_eq!(driver.calls().cleans, 1);
    }
}
