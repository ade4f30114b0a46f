pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod infra;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod output;
pub mod period;
pub mod report;
pub mod services;
