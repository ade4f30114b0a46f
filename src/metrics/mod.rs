//! Monthly driving-behaviour metrics.
//!
//! Each metric is an independent reduction over the month's trips or
//! events. [`Aggregator`] holds the configuration and merges the results
//! into a [`MonthlySummary`].

pub mod aggregate;
pub mod night;
pub mod no_drive;
pub mod speed;
pub mod types;
pub mod violations;

pub use aggregate::Aggregator;
pub use types::{
    LimitSource, MonthlySummary, NoDriveDays, SpeedViolation, SpeedViolations, ViolationCounts,
};
