//! CLI command implementations

pub mod combine;
pub mod stats;
pub mod yield_report;
