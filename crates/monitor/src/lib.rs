//! Bucket size monitor service
//!
//! The binary wires the monitor library into a long-running service: queue
//! consumers, an alarm ticker and the HTTP API.

pub mod api;
pub mod config;
pub mod pipeline;
