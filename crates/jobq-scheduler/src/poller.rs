//! Background poller: drives `poll_tick` on a fixed cadence.

use crate::{InMemoryScheduler, Scheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shortest cadence accepted; `tokio::time::interval` panics on a zero period.
pub(crate) const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Running poller task; dropping the handle leaves the task running.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop after the current tick and wait for the task to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "poller task ended abnormally");
        }
    }
}

pub struct Poller;

impl Poller {
    /// Spawn a task calling `poll_tick` every `interval` until shut down.
    pub fn spawn(scheduler: Arc<InMemoryScheduler>, interval: Duration) -> PollerHandle {
        let interval = interval.max(MIN_POLL_INTERVAL);
        let (shutdown, mut rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_ms = interval.as_millis() as u64, "poller started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match scheduler.poll_tick().await {
                            Ok(report) if report.transitions > 0 || report.admitted > 0 => {
                                tracing::debug!(
                                    polled = report.polled,
                                    transitions = report.transitions,
                                    admitted = report.admitted,
                                    "poll tick"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!(error = %e, "poll tick failed"),
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("poller stopped");
        });
        PollerHandle { shutdown, task }
    }

    /// Tick every `interval` until the scheduler has no pending or active jobs.
    pub async fn run_until_idle(scheduler: &InMemoryScheduler, interval: Duration) {
        let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while !scheduler.is_idle().await {
            ticker.tick().await;
            if let Err(e) = scheduler.poll_tick().await {
                tracing::warn!(error = %e, "poll tick failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DriverRegistry, SchedulerConfig};
    use jobq_driver::ScriptedDriver;
    use jobq_types::{JobState, JobStatus, WorkDescriptor};

    fn scheduler() -> (Arc<ScriptedDriver>, Arc<InMemoryScheduler>) {
        let driver = Arc::new(ScriptedDriver::new("scripted"));
        let sched = InMemoryScheduler::new(
            DriverRegistry::new(driver.clone()),
            SchedulerConfig::default().with_max_running(1),
        );
        (driver, Arc::new(sched))
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_poller_drives_jobs_to_completion() {
        let (driver, sched) = scheduler();
        let a = sched.submit_job(WorkDescriptor::new("a", "noop")).await.unwrap();
        let b = sched.submit_job(WorkDescriptor::new("b", "noop")).await.unwrap();
        driver.set_status("a", JobStatus::Success);
        driver.set_status("b", JobStatus::Success);

        let poller = Poller::spawn(Arc::clone(&sched), Duration::from_millis(100));
        for _ in 0..20 {
            if sched.is_idle().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        poller.shutdown().await;

        assert_eq!(sched.job_status(a).await.unwrap(), JobState::Succeeded);
        assert_eq!(sched.job_status(b).await.unwrap(), JobState::Succeeded);
        assert_eq!(driver.calls().cleans, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_poller_still_ticks() {
        let (driver, sched) = scheduler();
        let a = sched.submit_job(WorkDescriptor::new("a", "noop")).await.unwrap();
        driver.set_status("a", JobStatus::Success);

        let poller = Poller::spawn(Arc::clone(&sched), Duration::ZERO);
        for _ in 0..20 {
            if sched.is_idle().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        poller.shutdown().await;
        assert_eq!(sched.job_status(a).await.unwrap(), JobState::Succeeded);

        let b = sched.submit_job(WorkDescriptor::new("b", "noop")).await.unwrap();
        driver.set_status("b", JobStatus::Failed);
        Poller::run_until_idle(&sched, Duration::ZERO).await;
        assert_eq!(sched.job_status(b).await.unwrap(), JobState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_idle_returns_once_queue_drains() {
        let (driver, sched) = scheduler();
        for name in ["a", "b", "c"] {
            sched
                .submit_job(WorkDescriptor::new(name, "noop"))
                .await
                .unwrap();
            driver.set_status(name, JobStatus::Failed);
        }
        Poller::run_until_idle(&sched, Duration::from_millis(10)).await;
        let summary = sched.summary().await;
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.pending + summary.active(), 0);
    }
}
