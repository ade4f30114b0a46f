//! Seams to external collaborators.

pub mod speed_limit;
