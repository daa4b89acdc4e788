//! HTTP surface of the jobq scheduling engine.

pub mod server;
