//! In-memory scheduler: job table behind one lock, FIFO admission, driver dispatch.

use crate::{DriverRegistry, Scheduler, SchedulerConfig, SchedulerError, TickReport};
use async_trait::async_trait;
use chrono::Utc;
use jobq_types::{
    JobError, JobEvent, JobHandle, JobId, JobRecord, JobState, JobStatus, QueueSummary,
    SubmissionError, WorkDescriptor,
};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;

const EVENT_CAPACITY: usize = 256;

struct JobEntry {
    record: JobRecord,
    work: WorkDescriptor,
    /// Present exactly while the job is `Submitted` or `Running`.
    handle: Option<JobHandle>,
    seq: u64,
}

struct JobTable {
    jobs: HashMap<JobId, JobEntry>,
    pending: VecDeque<JobId>,
    next_seq: u64,
    max_running: usize,
    paused: bool,
}

impl JobTable {
    fn active(&self) -> usize {
        self.jobs
            .values()
            .filter(|e| e.record.state.is_active())
            .count()
    }

    fn has_slot(&self) -> bool {
        self.max_running == 0 || self.active() < self.max_running
    }

    /// Ids matching `pred`, in submission order.
    fn ids_where(&self, pred: impl Fn(JobState) -> bool) -> Vec<JobId> {
        let mut ids: Vec<(u64, JobId)> = self
            .jobs
            .iter()
            .filter(|(_, e)| pred(e.record.state))
            .map(|(id, e)| (e.seq, *id))
            .collect();
        ids.sort_unstable_by_key(|(seq, _)| *seq);
        ids.into_iter().map(|(_, id)| id).collect()
    }
}

enum SubmitOutcome {
    Submitted,
    Retry,
    Failed,
}

enum PollOutcome {
    /// The driver did not answer within the timeout.
    NoAnswer,
    Unchanged,
    Changed { requeue: bool },
}

/// Scheduling engine over a set of registered drivers.
///
/// All table mutations, including the driver calls they trigger, run under a single
/// lock, so calls for one job handle are never concurrent.
pub struct InMemoryScheduler {
    registry: DriverRegistry,
    config: SchedulerConfig,
    table: Mutex<JobTable>,
    events: broadcast::Sender<JobEvent>,
}

impl InMemoryScheduler {
    pub fn new(registry: DriverRegistry, config: SchedulerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let table = JobTable {
            jobs: HashMap::new(),
            pending: VecDeque::new(),
            next_seq: 0,
            max_running: config.max_running,
            paused: false,
        };
        Self {
            registry,
            config,
            table: Mutex::new(table),
            events,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Receive every state transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Snapshot of one record.
    pub async fn job(&self, job_id: JobId) -> Result<JobRecord, SchedulerError> {
        let guard = self.table.lock().await;
        guard
            .jobs
            .get(&job_id)
            .map(|e| e.record.clone())
            .ok_or(SchedulerError::JobNotFound(job_id))
    }

    /// Snapshots of all records, in submission order.
    pub async fn list_jobs(&self) -> Vec<JobRecord> {
        let guard = self.table.lock().await;
        guard
            .ids_where(|_| true)
            .iter()
            .filter_map(|id| guard.jobs.get(id))
            .map(|e| e.record.clone())
            .collect()
    }

    pub async fn summary(&self) -> QueueSummary {
        let guard = self.table.lock().await;
        let mut s = QueueSummary {
            max_running: guard.max_running,
            paused: guard.paused,
            ..QueueSummary::default()
        };
        for e in guard.jobs.values() {
            match e.record.state {
                JobState::Pending => s.pending += 1,
                JobState::Submitted => s.submitted += 1,
                JobState::Running => s.running += 1,
                JobState::Succeeded => s.succeeded += 1,
                JobState::Failed => s.failed += 1,
                JobState::Aborted => s.aborted += 1,
            }
        }
        s
    }

    /// No pending and no active jobs.
    pub async fn is_idle(&self) -> bool {
        let guard = self.table.lock().await;
        guard.pending.is_empty() && guard.active() == 0
    }

    /// Stop admitting pending jobs. Active jobs keep being polled.
    pub async fn pause(&self) {
        self.table.lock().await.paused = true;
        tracing::info!("admission paused");
    }

    pub async fn resume(&self) -> usize {
        let mut guard = self.table.lock().await;
        guard.paused = false;
        tracing::info!("admission resumed");
        self.admit(&mut guard).await
    }

    pub async fn max_running(&self) -> usize {
        self.table.lock().await.max_running
    }

    /// Change the admission limit (0 = unlimited). Lowering it never stops active jobs.
    pub async fn set_max_running(&self, max_running: usize) -> usize {
        let mut guard = self.table.lock().await;
        guard.max_running = max_running;
        tracing::info!(max_running, "admission limit changed");
        self.admit(&mut guard).await
    }

    /// Cancel every job not yet in a terminal state; returns how many were cancelled.
    pub async fn cancel_all(&self) -> usize {
        let mut guard = self.table.lock().await;
        let table = &mut *guard;
        let ids = table.ids_where(|s| !s.is_terminal());
        for id in &ids {
            if let Some(entry) = table.jobs.get_mut(id) {
                self.cancel_entry(entry).await;
            }
        }
        table.pending.clear();
        tracing::info!(cancelled = ids.len(), "all jobs cancelled");
        ids.len()
    }

    /// Remove retired records, returning them in submission order.
    pub async fn reap(&self) -> Vec<JobRecord> {
        let mut guard = self.table.lock().await;
        let table = &mut *guard;
        let ids = table.ids_where(JobState::is_terminal);
        let reaped: Vec<JobRecord> = ids
            .iter()
            .filter_map(|id| table.jobs.remove(id))
            .map(|e| e.record)
            .collect();
        tracing::debug!(reaped = reaped.len(), "reaped retired jobs");
        reaped
    }

    fn transition(&self, entry: &mut JobEntry, to: JobState) {
        let from = entry.record.state;
        let at = Utc::now();
        entry.record.state = to;
        if to.is_terminal() {
            entry.record.finished_at = Some(at);
        }
        tracing::info!(
            job_id = %entry.record.id,
            name = %entry.record.name,
            driver = %entry.record.driver,
            %from,
            %to,
            "job state changed"
        );
        // No subscribers is fine.
        let _ = self.events.send(JobEvent {
            job_id: entry.record.id,
            from,
            to,
            at,
        });
    }

    /// Hand pending jobs to their drivers while slots are free. Jobs that fail
    /// submission with attempts left go to the back of the queue and wait for the
    /// next round.
    async fn admit(&self, table: &mut JobTable) -> usize {
        if table.paused {
            return 0;
        }
        let mut admitted = 0;
        for _ in 0..table.pending.len() {
            if !table.has_slot() {
                break;
            }
            let Some(id) = table.pending.pop_front() else {
                break;
            };
            let Some(entry) = table.jobs.get_mut(&id) else {
                continue;
            };
            if entry.record.state != JobState::Pending {
                continue;
            }
            match self.submit_entry(entry).await {
                SubmitOutcome::Submitted => admitted += 1,
                SubmitOutcome::Retry => table.pending.push_back(id),
                SubmitOutcome::Failed => {}
            }
        }
        admitted
    }

    async fn submit_entry(&self, entry: &mut JobEntry) -> SubmitOutcome {
        entry.record.submit_attempts += 1;
        let kind = entry.record.driver.clone();
        let result = match self.registry.resolve(&kind) {
            None => Err(SubmissionError::UnknownDriver(kind)),
            Some(driver) => timeout(self.config.driver_timeout, driver.submit(&entry.work))
                .await
                .unwrap_or(Err(SubmissionError::Timeout)),
        };
        match result {
            Ok(handle) => {
                entry.handle = Some(handle);
                entry.record.submitted_at = Some(Utc::now());
                entry.record.started_at = None;
                self.transition(entry, JobState::Submitted);
                SubmitOutcome::Submitted
            }
            Err(e) => {
                let attempts = entry.record.submit_attempts;
                let retry = !matches!(e, SubmissionError::UnknownDriver(_))
                    && attempts < self.config.max_submit;
                if retry {
                    tracing::warn!(
                        job_id = %entry.record.id,
                        attempts,
                        error = %e,
                        "submission failed, will retry"
                    );
                    SubmitOutcome::Retry
                } else {
                    tracing::error!(
                        job_id = %entry.record.id,
                        attempts,
                        error = %e,
                        "submission failed"
                    );
                    entry.record.error = Some(JobError::Submission(e));
                    self.transition(entry, JobState::Failed);
                    SubmitOutcome::Failed
                }
            }
        }
    }

    async fn poll_entry(&self, entry: &mut JobEntry) -> PollOutcome {
        let (Some(handle), Some(driver)) = (
            entry.handle.as_ref(),
            self.registry.resolve(&entry.record.driver),
        ) else {
            return PollOutcome::NoAnswer;
        };
        let status = match timeout(self.config.driver_timeout, driver.get_status(handle)).await {
            Ok(status) => status,
            Err(_) => {
                tracing::warn!(job_id = %entry.record.id, "status query timed out");
                return PollOutcome::NoAnswer;
            }
        };
        let now = Utc::now();
        entry.record.last_polled_at = Some(now);
        match status {
            JobStatus::Waiting => PollOutcome::Unchanged,
            JobStatus::Running if entry.record.state == JobState::Running => {
                PollOutcome::Unchanged
            }
            JobStatus::Running => {
                entry.record.started_at = Some(now);
                self.transition(entry, JobState::Running);
                PollOutcome::Changed { requeue: false }
            }
            JobStatus::Success => {
                self.transition(entry, JobState::Succeeded);
                self.clean_entry(entry).await;
                PollOutcome::Changed { requeue: false }
            }
            JobStatus::Failed => {
                self.clean_entry(entry).await;
                if entry.record.submit_attempts < self.config.max_submit {
                    tracing::warn!(
                        job_id = %entry.record.id,
                        attempts = entry.record.submit_attempts,
                        "job failed, resubmitting"
                    );
                    self.transition(entry, JobState::Pending);
                    PollOutcome::Changed { requeue: true }
                } else {
                    entry.record.error = Some(JobError::BackendFailed);
                    self.transition(entry, JobState::Failed);
                    PollOutcome::Changed { requeue: false }
                }
            }
            JobStatus::NotFound => {
                // The backend holds nothing for this job any more: drop the handle
                // without cleaning.
                entry.handle = None;
                tracing::error!(job_id = %entry.record.id, "backend lost job");
                entry.record.error = Some(JobError::BackendLost);
                self.transition(entry, JobState::Failed);
                PollOutcome::Changed { requeue: false }
            }
        }
    }

    async fn clean_entry(&self, entry: &mut JobEntry) {
        let (Some(handle), Some(driver)) = (
            entry.handle.take(),
            self.registry.resolve(&entry.record.driver),
        ) else {
            return;
        };
        match timeout(self.config.driver_timeout, driver.clean(handle)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(job_id = %entry.record.id, error = %e, "clean failed")
            }
            Err(_) => tracing::warn!(job_id = %entry.record.id, "clean timed out"),
        }
    }

    /// Abort (if submitted) and mark `Aborted`. Caller removes the id from `pending`.
    async fn cancel_entry(&self, entry: &mut JobEntry) {
        if let (Some(handle), Some(driver)) = (
            entry.handle.take(),
            self.registry.resolve(&entry.record.driver),
        ) {
            match timeout(self.config.driver_timeout, driver.abort(handle)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(job_id = %entry.record.id, error = %e, "abort failed")
                }
                Err(_) => tracing::warn!(job_id = %entry.record.id, "abort timed out"),
            }
        }
        self.transition(entry, JobState::Aborted);
    }
}

#[async_trait]
impl Scheduler for InMemoryScheduler {
    async fn submit_job(&self, work: WorkDescriptor) -> Result<JobId, SchedulerError> {
        let job_id = JobId::new();
        let driver = self.registry.kind_for(work.driver.as_ref());
        let record = JobRecord::new(job_id, work.name.clone(), driver);
        let mut guard = self.table.lock().await;
        let table = &mut *guard;
        let seq = table.next_seq;
        table.next_seq += 1;
        table.jobs.insert(
            job_id,
            JobEntry {
                record,
                work,
                handle: None,
                seq,
            },
        );
        table.pending.push_back(job_id);
        tracing::debug!(job_id = %job_id, "job accepted");
        self.admit(table).await;
        Ok(job_id)
    }

    async fn cancel_job(&self, job_id: JobId) -> Result<(), SchedulerError> {
        let mut guard = self.table.lock().await;
        let table = &mut *guard;
        let entry = table
            .jobs
            .get_mut(&job_id)
            .filter(|e| !e.record.state.is_terminal())
            .ok_or(SchedulerError::JobNotFound(job_id))?;
        let was_pending = entry.record.state == JobState::Pending;
        self.cancel_entry(entry).await;
        if was_pending {
            table.pending.retain(|id| *id != job_id);
        }
        self.admit(table).await;
        Ok(())
    }

    async fn job_status(&self, job_id: JobId) -> Result<JobState, SchedulerError> {
        let guard = self.table.lock().await;
        guard
            .jobs
            .get(&job_id)
            .map(|e| e.record.state)
            .ok_or(SchedulerError::JobNotFound(job_id))
    }

    async fn poll_tick(&self) -> Result<TickReport, SchedulerError> {
        let mut guard = self.table.lock().await;
        let table = &mut *guard;
        let mut report = TickReport::default();
        for id in table.ids_where(JobState::is_active) {
            let Some(entry) = table.jobs.get_mut(&id) else {
                continue;
            };
            match self.poll_entry(entry).await {
                PollOutcome::NoAnswer => {}
                PollOutcome::Unchanged => report.polled += 1,
                PollOutcome::Changed { requeue } => {
                    report.polled += 1;
                    report.transitions += 1;
                    if requeue {
                        table.pending.push_back(id);
                    }
                }
            }
        }
        report.admitted = self.admit(table).await;
        Ok(report)
    }
}
