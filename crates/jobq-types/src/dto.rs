//! Work descriptors and response envelopes.

use crate::{DriverKind, JobId, JobRecord, QueueSummary};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// What a backend should execute. Opaque to the engine apart from `driver`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkDescriptor {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the job; backend default when absent.
    #[serde(default)]
    pub run_path: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_num_cpu")]
    pub num_cpu: u32,
    /// Registered backend to run on; the registry default when absent.
    #[serde(default)]
    pub driver: Option<DriverKind>,
}

fn default_num_cpu() -> u32 {
    1
}

impl WorkDescriptor {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            run_path: None,
            env: HashMap::new(),
            num_cpu: default_num_cpu(),
            driver: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_run_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.run_path = Some(path.into());
        self
    }

    pub fn with_driver(mut self, kind: impl Into<DriverKind>) -> Self {
        self.driver = Some(kind.into());
        self
    }
}

/// Base response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseResponse<T> {
    #[serde(default = "default_code")]
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

fn default_code() -> i32 {
    200
}

impl<T> BaseResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            message: "Success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Payload of a successful submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobData {
    pub job_id: JobId,
}

pub type SubmitJobResponse = BaseResponse<SubmitJobData>;
pub type JobResponse = BaseResponse<JobRecord>;
pub type JobListResponse = BaseResponse<Vec<JobRecord>>;
pub type SummaryResponse = BaseResponse<QueueSummary>;
