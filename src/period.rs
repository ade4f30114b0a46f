//! Calendar window a summary is evaluated over.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};
use crate::model::TripRecord;

/// How far the period extends past the report's first month day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodMode {
    /// First to last day of the month.
    #[default]
    FullMonth,
    /// First day of the month up to the last day present in the report.
    MonthToDate,
}

/// Inclusive date range, always within a single month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportPeriod {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl ReportPeriod {
    /// The full calendar month `year-month`.
    pub fn month(year: i32, month: u32) -> Result<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| MetricsError::invalid_config(format!("no such month {year}-{month}")))?;
        Ok(Self {
            first,
            last: last_day_of_month(first),
        })
    }

    /// Parses `YYYY-MM`.
    pub fn parse_month(s: &str) -> Result<Self> {
        let (year, month) = s
            .split_once('-')
            .and_then(|(y, m)| Some((y.parse::<i32>().ok()?, m.parse::<u32>().ok()?)))
            .ok_or_else(|| MetricsError::invalid_config(format!("expected YYYY-MM, got '{s}'")))?;
        Self::month(year, month)
    }

    /// Derives the period from the earliest well-formed trip.
    ///
    /// Returns `None` when no trip has a usable start date.
    pub fn from_trips(trips: &[TripRecord], mode: PeriodMode) -> Option<Self> {
        let dates: Vec<NaiveDate> = trips
            .iter()
            .filter_map(|t| t.span().ok())
            .map(|s| s.start.date())
            .collect();

        let earliest = dates.iter().min()?;
        let first = earliest.with_day(1)?;
        let month_end = last_day_of_month(first);

        let last = match mode {
            PeriodMode::FullMonth => month_end,
            PeriodMode::MonthToDate => dates
                .iter()
                .copied()
                .filter(|d| *d <= month_end)
                .max()
                .unwrap_or(first),
        };

        Some(Self { first, last })
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.first.iter_days().take_while(|d| *d <= self.last)
    }

    pub fn day_count(&self) -> usize {
        ((self.last - self.first).num_days() + 1).max(0) as usize
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.first <= date && date <= self.last
    }
}

fn last_day_of_month(first: NaiveDate) -> NaiveDate {
    let (y, m) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(first)
}
