use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::metrics::types::NoDriveDays;
use crate::model::TripRecord;
use crate::period::ReportPeriod;

/// Days of `period` that no well-formed trip overlaps.
///
/// Trips spanning midnight mark every date they touch as driven.
pub fn count_no_drive_days(trips: &[TripRecord], period: &ReportPeriod) -> NoDriveDays {
    let driven: BTreeSet<NaiveDate> = trips
        .iter()
        .filter_map(|t| t.span().ok())
        .flat_map(|s| s.dates())
        .filter(|d| period.contains(*d))
        .collect();

    let dates = period.days().filter(|d| !driven.contains(d)).collect();

    NoDriveDays {
        dates,
        drive_days: driven.len(),
        calendar_days: period.day_count(),
    }
}
