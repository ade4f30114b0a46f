//! Workbook export.
//!
//! The scoring workbook reads one flat row per vehicle-month. The export
//! file keeps exactly one row per period start, so re-running a month
//! (for instance a month-to-date run followed by the full month) replaces
//! the earlier figures instead of duplicating them.

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::metrics::MonthlySummary;

/// One summary flattened into the named values the workbook consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub generated_at: DateTime<Utc>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub driving_penalty: f64,
    pub night_penalty: f64,
    pub no_drive_days: usize,
    pub total_distance: f64,
    pub harsh_brake: usize,
    pub harsh_accel: usize,
    pub harsh_corner: usize,
    pub speed_violations: usize,
    pub unknown_speed_limits: usize,
    pub trips_counted: usize,
    pub trips_excluded: usize,
}

impl From<&MonthlySummary> for ExportRow {
    fn from(s: &MonthlySummary) -> Self {
        Self {
            generated_at: Utc::now(),
            period_start: s.period.first,
            period_end: s.period.last,
            driving_penalty: s.driving_penalty(),
            night_penalty: s.night_penalty,
            no_drive_days: s.no_drive.count(),
            total_distance: s.total_distance,
            harsh_brake: s.harsh_events.harsh_brake,
            harsh_accel: s.harsh_events.harsh_accel,
            harsh_corner: s.harsh_events.harsh_corner,
            speed_violations: s.speed.count(),
            unknown_speed_limits: s.speed.unknown_limit_samples,
            trips_counted: s.trips_counted,
            trips_excluded: s.trips_excluded,
        }
    }
}

/// Reads every row of an export file. A missing file has no rows.
pub fn read_export(path: impl AsRef<Path>) -> Result<Vec<ExportRow>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut rdr = csv::Reader::from_path(path)?;
    let rows = rdr.deserialize().collect::<std::result::Result<_, _>>()?;
    Ok(rows)
}

/// Stores `row` in the export file, replacing any row for the same period
/// start. Rows are kept in period order and the file is rewritten through a
/// sibling temp file so a failed write leaves the previous export intact.
pub fn write_export(path: impl AsRef<Path>, row: &ExportRow) -> Result<()> {
    let path = path.as_ref();
    let mut rows = read_export(path)?;

    let before = rows.len();
    rows.retain(|r| r.period_start != row.period_start);
    let replaced = before - rows.len();
    rows.push(row.clone());
    rows.sort_by_key(|r| r.period_start);

    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        for r in &rows {
            writer.serialize(r)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;

    debug!(path = %path.display(), rows = rows.len(), replaced, "Export written");
    Ok(())
}

/// Logs the headline figures, plus the whole summary as JSON when asked.
pub fn log_summary(summary: &MonthlySummary, json: bool) -> Result<()> {
    info!(
        period_start = %summary.period.first,
        period_end = %summary.period.last,
        no_drive_days = summary.no_drive.count(),
        harsh_events = summary.harsh_events.total(),
        speed_violations = summary.speed.count(),
        unknown_speed_limits = summary.speed.unknown_limit_samples,
        driving_penalty = summary.driving_penalty(),
        night_penalty = summary.night_penalty,
        total_distance = summary.total_distance,
        "Vehicle-month"
    );

    if json {
        info!(summary = %serde_json::to_string(summary)?, "Summary JSON");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{NoDriveDays, SpeedViolations, ViolationCounts};
    use crate::period::ReportPeriod;
    use std::env;

    fn temp_path(name: &str) -> std::path::PathBuf {
        env::temp_dir().join(name)
    }

    fn summary(month: u32, night_penalty: f64) -> MonthlySummary {
        let period = ReportPeriod::month(2025, month).unwrap();
        MonthlySummary {
            no_drive: NoDriveDays {
                dates: vec![period.last],
                drive_days: period.day_count() - 1,
                calendar_days: period.day_count(),
            },
            period,
            harsh_events: ViolationCounts {
                harsh_brake: 2,
                penalty_points: 16.0,
                ..Default::default()
            },
            speed: SpeedViolations {
                penalty_points: 3.0,
                ..Default::default()
            },
            night_penalty,
            total_distance: 812.0,
            trips_counted: 44,
            trips_excluded: 1,
            trips_outside_period: 0,
            warnings: vec![],
        }
    }

    #[test]
    fn test_export_row_from_summary() {
        let row = ExportRow::from(&summary(5, 4.5));
        assert_eq!(row.driving_penalty, 19.0);
        assert_eq!(row.no_drive_days, 1);
        assert_eq!(row.harsh_brake, 2);
        assert_eq!(row.period_end, NaiveDate::from_ymd_opt(2025, 5, 31).unwrap());
    }

    #[test]
    fn test_log_summary_with_json() {
        log_summary(&summary(5, 4.5), true).unwrap();
    }

    #[test]
    fn test_read_export_missing_file_is_empty() {
        let path = temp_path("drive_metrics_test_missing.csv");
        let _ = fs::remove_file(&path);
        assert!(read_export(&path).unwrap().is_empty());
    }

    #[test]
    fn test_write_export_replaces_same_month() {
        let path = temp_path("drive_metrics_test_upsert.csv");
        let _ = fs::remove_file(&path);

        write_export(&path, &ExportRow::from(&summary(6, 1.0))).unwrap();
        write_export(&path, &ExportRow::from(&summary(5, 1.0))).unwrap();
        write_export(&path, &ExportRow::from(&summary(5, 4.5))).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("generated_at")).count();
        assert_eq!(header_count, 1);

        let rows = read_export(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].period_start, NaiveDate::from_ymd_opt(2025, 5, 1).unwrap());
        assert_eq!(rows[0].night_penalty, 4.5);
        assert_eq!(rows[1].period_start, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());

        fs::remove_file(&path).unwrap();
    }
}
