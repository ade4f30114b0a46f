use tracing::{info, warn};

use crate::cache::SpeedLimitCache;
use crate::config::AggregatorConfig;
use crate::error::{MetricsError, Result};
use crate::metrics::types::{MonthlySummary, NoDriveDays, SpeedViolations, ViolationCounts};
use crate::metrics::{night, no_drive, speed, violations};
use crate::model::{EventRecord, MovementReport, TripRecord};
use crate::period::ReportPeriod;

/// Computes the monthly metrics for one vehicle.
///
/// The configuration is validated once, at construction.
#[derive(Debug, Clone)]
pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidConfiguration`] if any option is out of range.
    pub fn new(config: AggregatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn count_no_drive_days(&self, trips: &[TripRecord], period: &ReportPeriod) -> NoDriveDays {
        no_drive::count_no_drive_days(trips, period)
    }

    pub fn count_driving_violations<'a>(
        &self,
        events: impl IntoIterator<Item = &'a EventRecord>,
    ) -> ViolationCounts {
        violations::count_driving_violations(events, &self.config)
    }

    pub async fn count_speed_violations(
        &self,
        trips: &[TripRecord],
        cache: &mut SpeedLimitCache,
    ) -> SpeedViolations {
        speed::count_speed_violations(trips, cache, &self.config).await
    }

    pub fn compute_night_penalty(&self, trips: &[TripRecord]) -> f64 {
        night::compute_night_penalty(trips, &self.config)
    }

    /// Plain sum of recorded trip distances, in the report's unit.
    pub fn total_distance(&self, trips: &[TripRecord]) -> f64 {
        trips.iter().map(|t| t.distance).sum()
    }

    /// Runs every metric over `report` and merges the results.
    ///
    /// Trips with missing or inverted timestamps are left out and noted in
    /// the summary's warnings. Only trips touching the period and events
    /// dated inside it are aggregated. When `period` is `None` it is derived
    /// from the trips using the configured
    /// [`PeriodMode`](crate::period::PeriodMode).
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidConfiguration`] if no period was given
    /// and the report has no well-formed trip to derive one from.
    #[tracing::instrument(skip_all, fields(trips = report.trips.len()))]
    pub async fn summarize(
        &self,
        report: &MovementReport,
        period: Option<ReportPeriod>,
        cache: &mut SpeedLimitCache,
    ) -> Result<MonthlySummary> {
        let mut warnings = report.warnings.clone();

        let mut trips = Vec::with_capacity(report.trips.len());
        let mut trips_excluded = 0;
        for trip in &report.trips {
            match trip.span() {
                Ok(_) => trips.push(trip.clone()),
                Err(e) => {
                    warn!(trip = trip.number, error = %e, "Excluding trip");
                    warnings.push(e.to_string());
                    trips_excluded += 1;
                }
            }
        }

        let period = period
            .or_else(|| ReportPeriod::from_trips(&trips, self.config.period_mode))
            .ok_or_else(|| {
                MetricsError::invalid_config(
                    "no reporting period given and the report has no usable trips",
                )
            })?;
        info!(first = %period.first, last = %period.last, "Reporting period");

        let before = trips.len();
        trips.retain(|t| {
            t.span()
                .is_ok_and(|s| s.dates().iter().any(|d| period.contains(*d)))
        });
        let trips_outside_period = before - trips.len();
        if trips_outside_period > 0 {
            info!(trips_outside_period, "Ignoring trips outside the reporting period");
        }

        let no_drive = self.count_no_drive_days(&trips, &period);
        let harsh_events = self.count_driving_violations(
            report
                .events()
                .filter(|e| period.contains(e.timestamp.date())),
        );
        let speed = self.count_speed_violations(&trips, cache).await;
        if speed.lookup_skipped {
            warnings.push(
                "external speed lookup skipped: too many segments, default limit used".to_string(),
            );
        }
        let night_penalty = self.compute_night_penalty(&trips);
        let total_distance = self.total_distance(&trips);

        let summary = MonthlySummary {
            period,
            no_drive,
            harsh_events,
            speed,
            night_penalty,
            total_distance,
            trips_counted: trips.len(),
            trips_excluded,
            trips_outside_period,
            warnings,
        };

        info!(
            no_drive_days = summary.no_drive.count(),
            harsh_events = summary.harsh_events.total(),
            speed_violations = summary.speed.count(),
            driving_penalty = summary.driving_penalty(),
            night_penalty = summary.night_penalty,
            total_distance = summary.total_distance,
            "Monthly summary"
        );

        Ok(summary)
    }
}
