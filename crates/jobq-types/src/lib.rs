//! Core types and the driver capability trait for the jobq scheduling engine.
//!
//! Backends implement [`QueueDriver`]; the engine tracks each job as a [`JobRecord`].

mod dto;
mod lifecycle;
mod traits;

pub use dto::*;
pub use lifecycle::*;
pub use traits::*;
