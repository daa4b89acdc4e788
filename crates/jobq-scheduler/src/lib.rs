//! Job scheduling engine: FIFO admission over pluggable queue drivers, status polling,
//! and retirement of finished jobs.

mod config;
mod memory;
mod poller;
mod registry;
mod trait_;

pub use config::{ConfigError, SchedulerConfig};
pub use memory::InMemoryScheduler;
pub use poller::{Poller, PollerHandle};
pub use registry::DriverRegistry;
pub use trait_::{Scheduler, SchedulerError, TickReport};
