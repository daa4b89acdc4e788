//! Engine configuration, from code or from `JOBQ_*` environment variables.

use crate::poller::MIN_POLL_INTERVAL;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Admission limit, retry policy and timing of the scheduling engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum jobs in `Submitted`/`Running` at once; 0 means unlimited.
    pub max_running: usize,
    /// Submission attempts per job before it is marked failed (at least 1).
    pub max_submit: u32,
    /// Cadence of the background poller; never below one millisecond.
    pub poll_interval: Duration,
    /// Upper bound on any single driver call.
    pub driver_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_running: 4,
            max_submit: 1,
            poll_interval: Duration::from_millis(1000),
            driver_timeout: Duration::from_millis(10_000),
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_running(mut self, n: usize) -> Self {
        self.max_running = n;
        self
    }

    pub fn with_max_submit(mut self, n: u32) -> Self {
        self.max_submit = n.max(1);
        self
    }

    pub fn with_poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_driver_timeout(mut self, d: Duration) -> Self {
        self.driver_timeout = d;
        self
    }

    /// Defaults overridden by `JOBQ_MAX_RUNNING`, `JOBQ_MAX_SUBMIT`,
    /// `JOBQ_POLL_INTERVAL_MS` and `JOBQ_DRIVER_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Some(n) = parse(&lookup, "JOBQ_MAX_RUNNING")? {
            cfg.max_running = n;
        }
        if let Some(n) = parse::<u32>(&lookup, "JOBQ_MAX_SUBMIT")? {
            if n == 0 {
                return Err(ConfigError::Invalid {
                    key: "JOBQ_MAX_SUBMIT",
                    value: n.to_string(),
                });
            }
            cfg.max_submit = n;
        }
        if let Some(ms) = parse::<u64>(&lookup, "JOBQ_POLL_INTERVAL_MS")? {
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    key: "JOBQ_POLL_INTERVAL_MS",
                    value: ms.to_string(),
                });
            }
            cfg.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&lookup, "JOBQ_DRIVER_TIMEOUT_MS")? {
            cfg.driver_timeout = Duration::from_millis(ms);
        }
        Ok(cfg)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn env_overrides_defaults() {
        let cfg = SchedulerConfig::from_lookup(lookup(&[
            ("JOBQ_MAX_RUNNING", "2"),
            ("JOBQ_POLL_INTERVAL_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(cfg.max_running, 2);
        assert_eq!(cfg.max_submit, 1);
        assert_eq!(cfg.poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.driver_timeout, Duration::from_secs(10));
    }

    #[test]
    fn rejects_garbage_and_zero_attempts() {
        let err = SchedulerConfig::from_lookup(lookup(&[("JOBQ_MAX_RUNNING", "many")]));
        assert!(matches!(
            err,
            Err(ConfigError::Invalid {
                key: "JOBQ_MAX_RUNNING",
                ..
            })
        ));
        assert!(SchedulerConfig::from_lookup(lookup(&[("JOBQ_MAX_SUBMIT", "0")])).is_err());
    }

    #[test]
    fn zero_poll_interval_is_rejected_or_clamped() {
        let err = SchedulerConfig::from_lookup(lookup(&[("JOBQ_POLL_INTERVAL_MS", "0")]));
        assert!(matches!(
            err,
            Err(ConfigError::Invalid {
                key: "JOBQ_POLL_INTERVAL_MS",
                ..
            })
        ));
        let cfg = SchedulerConfig::default().with_poll_interval(Duration::ZERO);
        assert_eq!(cfg.poll_interval, Duration::from_millis(1));
    }
}
