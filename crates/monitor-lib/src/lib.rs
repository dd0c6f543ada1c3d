//! Core library for the bucket size monitor
//!
//! This crate provides the core functionality for:
//! - Routing storage change notifications to independent consumers
//! - Aggregating bucket sizes into a snapshot time series
//! - Sliding-window growth alarms with largest-object eviction
//! - Rendering the recent size history as a PNG chart
//! - Health checks and observability

pub mod aggregator;
pub mod alarm;
pub mod clock;
pub mod error;
pub mod health;
pub mod ingestion;
pub mod models;
pub mod notification;
pub mod observability;
pub mod report;
pub mod router;
pub mod storage;
pub mod timeseries;

pub use aggregator::MetricsAggregator;
pub use error::{MonitorError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
pub use router::EventRouter;
