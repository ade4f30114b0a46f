//! Result types produced by the metric reducers.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::model::EventKind;
use crate::period::ReportPeriod;

/// Calendar days of the period without a single trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoDriveDays {
    /// Sorted, for auditing against the raw report.
    pub dates: Vec<NaiveDate>,
    pub drive_days: usize,
    pub calendar_days: usize,
}

impl NoDriveDays {
    pub fn count(&self) -> usize {
        self.dates.len()
    }
}

/// Harsh events above their thresholds, by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViolationCounts {
    pub harsh_brake: usize,
    pub harsh_accel: usize,
    pub harsh_corner: usize,
    /// Events dropped as repeats of a recent event of the same kind.
    pub suppressed_duplicates: usize,
    pub penalty_points: f64,
}

impl ViolationCounts {
    pub fn get(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::HarshBrake => self.harsh_brake,
            EventKind::HarshAccel => self.harsh_accel,
            EventKind::HarshCorner => self.harsh_corner,
        }
    }

    pub(crate) fn get_mut(&mut self, kind: EventKind) -> &mut usize {
        match kind {
            EventKind::HarshBrake => &mut self.harsh_brake,
            EventKind::HarshAccel => &mut self.harsh_accel,
            EventKind::HarshCorner => &mut self.harsh_corner,
        }
    }

    pub fn total(&self) -> usize {
        self.harsh_brake + self.harsh_accel + self.harsh_corner
    }
}

/// Where the limit a sample was checked against came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitSource {
    Embedded,
    Lookup,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedViolation {
    pub trip: usize,
    pub timestamp: NaiveDateTime,
    pub speed: f64,
    pub limit: f64,
    pub excess: f64,
    /// Acceleration reported with the offending sample, if any.
    pub acceleration: Option<f64>,
    pub limit_source: LimitSource,
    pub points: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpeedViolations {
    pub violations: Vec<SpeedViolation>,
    pub checked_samples: usize,
    /// Samples left out because no limit could be determined.
    pub unknown_limit_samples: usize,
    pub lookup_calls: usize,
    /// Set when too many segments needed resolving and the lookup was bypassed.
    pub lookup_skipped: bool,
    pub penalty_points: f64,
}

impl SpeedViolations {
    pub fn count(&self) -> usize {
        self.violations.len()
    }
}

/// Everything the scoring workbook needs for one vehicle-month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    pub period: ReportPeriod,
    pub no_drive: NoDriveDays,
    pub harsh_events: ViolationCounts,
    pub speed: SpeedViolations,
    pub night_penalty: f64,
    pub total_distance: f64,
    pub trips_counted: usize,
    pub trips_excluded: usize,
    /// Well-formed trips that fall entirely outside the period.
    pub trips_outside_period: usize,
    pub warnings: Vec<String>,
}

impl MonthlySummary {
    /// Harsh-event and speeding points combined.
    pub fn driving_penalty(&self) -> f64 {
        self.harsh_events.penalty_points + self.speed.penalty_points
    }
}
