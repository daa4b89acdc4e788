//! Queue driver backends.

mod local;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use jobq_types::{DriverError, DriverKind, JobHandle, JobStatus, QueueDriver, SubmissionError};
pub use local::{LocalDriver, LOCAL_KIND};

#[cfg(any(test, feature = "test-util"))]
pub use mock::{DriverCalls, ScriptedDriver};
