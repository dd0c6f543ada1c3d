//! Size-growth alarm and remediation
//!
//! This module provides:
//! - Delta recording into the alarm window series
//! - Threshold evaluation over a sliding window
//! - Eviction of an object chosen by a pluggable policy

mod evaluator;
mod policy;
mod remediator;

pub use evaluator::{
    AlarmEvaluation, AlarmEvaluator, AlarmRule, AlarmState, DeltaRecorder, EvictionResult,
    DEFAULT_THRESHOLD_BYTES, DEFAULT_WINDOW,
};
pub use policy::{EvictionPolicy, LargestObjectPolicy};
pub use remediator::Remediator;
