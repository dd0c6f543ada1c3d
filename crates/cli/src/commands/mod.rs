//! Subcommand implementations

pub mod alarm;
pub mod objects;
pub mod report;
pub mod status;
