//! Night-driving penalty.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Timelike};

use crate::config::AggregatorConfig;
use crate::model::{TripRecord, TripSpan};

/// Daily window `[start, end)`. Wraps past midnight when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl NightWindow {
    pub fn from_config(config: &AggregatorConfig) -> Self {
        Self {
            start: config.night_window_start,
            end: config.night_window_end,
        }
    }

    fn wraps(&self) -> bool {
        self.start > self.end
    }

    /// Parts of `span` that fall inside the window, in time order.
    pub fn overlaps(&self, span: &TripSpan) -> Vec<(NaiveDateTime, NaiveDateTime)> {
        let first = span.start.date().pred_opt().unwrap_or(span.start.date());
        let last = span.end.date();

        first
            .iter_days()
            .take_while(|d| *d <= last)
            .filter_map(|day| {
                let window_start = day.and_time(self.start);
                let window_end = if self.wraps() {
                    day.succ_opt()?.and_time(self.end)
                } else {
                    day.and_time(self.end)
                };
                let from = window_start.max(span.start);
                let to = window_end.min(span.end);
                (from < to).then_some((from, to))
            })
            .collect()
    }
}

fn hours(d: TimeDelta) -> f64 {
    d.num_milliseconds() as f64 / 3_600_000.0
}

/// Hours in `[from, to)` times their weight. Hours of day listed in
/// `hourly` use that weight, all others `flat`.
fn weighted_hours(
    from: NaiveDateTime,
    to: NaiveDateTime,
    flat: f64,
    hourly: &BTreeMap<u32, f64>,
) -> f64 {
    if hourly.is_empty() {
        return hours(to - from) * flat;
    }

    let mut total = 0.0;
    let mut cursor = from;
    while cursor < to {
        let into_hour = (cursor.num_seconds_from_midnight() % 3600) as i64;
        let chunk_end = (cursor + TimeDelta::seconds(3600 - into_hour)).min(to);
        let weight = hourly.get(&cursor.hour()).copied().unwrap_or(flat);
        total += hours(chunk_end - cursor) * weight;
        cursor = chunk_end;
    }
    total
}

/// Night penalty of one trip. Zero for trips wholly outside the window.
pub fn trip_night_penalty(span: &TripSpan, config: &AggregatorConfig) -> f64 {
    NightWindow::from_config(config)
        .overlaps(span)
        .into_iter()
        .map(|(from, to)| {
            weighted_hours(
                from,
                to,
                config.night_penalty_weight,
                &config.night_hourly_weights,
            )
        })
        .sum()
}

/// Sum of [`trip_night_penalty`] over the well-formed trips.
pub fn compute_night_penalty(trips: &[TripRecord], config: &AggregatorConfig) -> f64 {
    trips
        .iter()
        .filter_map(|t| t.span().ok())
        .map(|s| trip_night_penalty(&s, config))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: &str, end: &str) -> TripSpan {
        TripSpan {
            start: NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M").unwrap(),
            end: NaiveDateTime::parse_from_str(end, "%Y-%m-%d %H:%M").unwrap(),
        }
    }

    fn trip(start: &str, end: &str) -> TripRecord {
        let s = span(start, end);
        TripRecord {
            start: Some(s.start),
            end: Some(s.end),
            ..Default::default()
        }
    }

    fn config(weight: f64) -> AggregatorConfig {
        AggregatorConfig {
            night_window_start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            night_window_end: NaiveTime::from_hms_opt(5, 0, 0).unwrap(),
            night_penalty_weight: weight,
            ..Default::default()
        }
    }

    #[test]
    fn test_two_hour_trip_inside_window() {
        let trips = vec![trip("2025-05-03 23:00", "2025-05-04 01:00")];
        assert_eq!(compute_night_penalty(&trips, &config(1.5)), 3.0);
    }

    #[test]
    fn test_trip_outside_window_is_zero() {
        let trips = vec![trip("2025-05-03 08:00", "2025-05-03 17:00")];
        assert_eq!(compute_night_penalty(&trips, &config(1.5)), 0.0);
    }

    #[test]
    fn test_partial_overlap_at_both_ends() {
        // 21:00-22:30 contributes 0.5h, 04:30-06:00 contributes 0.5h.
        let trips = vec![
            trip("2025-05-03 21:00", "2025-05-03 22:30"),
            trip("2025-05-05 04:30", "2025-05-05 06:00"),
        ];
        assert_eq!(compute_night_penalty(&trips, &config(2.0)), 2.0);
    }

    #[test]
    fn test_trip_ending_at_window_start_is_zero() {
        let trips = vec![trip("2025-05-03 20:00", "2025-05-03 22:00")];
        assert_eq!(compute_night_penalty(&trips, &config(1.0)), 0.0);
    }

    #[test]
    fn test_non_wrapping_window() {
        let config = AggregatorConfig {
            night_window_start: NaiveTime::from_hms_opt(1, 0, 0).unwrap(),
            night_window_end: NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
            ..Default::default()
        };
        let trips = vec![trip("2025-05-03 00:00", "2025-05-03 02:00")];
        assert_eq!(compute_night_penalty(&trips, &config), 1.0);
    }

    #[test]
    fn test_long_trip_spanning_two_nights() {
        let trips = vec![trip("2025-05-03 21:00", "2025-05-04 23:00")];
        // 7h the first night, 1h the second.
        assert_eq!(compute_night_penalty(&trips, &config(1.0)), 8.0);
    }

    #[test]
    fn test_hourly_weights_override_flat_weight() {
        let mut hourly = BTreeMap::new();
        hourly.insert(23, 2.0);
        hourly.insert(0, 4.0);
        let config = AggregatorConfig {
            night_hourly_weights: hourly,
            ..config(1.0)
        };
        // 22:30-23:00 flat, 23:00-00:00 at 2, 00:00-00:30 at 4.
        let trips = vec![trip("2025-05-03 22:30", "2025-05-04 00:30")];
        assert_eq!(compute_night_penalty(&trips, &config), 0.5 + 2.0 + 2.0);
    }

    #[test]
    fn test_overlaps_are_clipped_to_trip() {
        let window = NightWindow::from_config(&config(1.0));
        let parts = window.overlaps(&span("2025-05-03 23:15", "2025-05-03 23:45"));
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].0, span("2025-05-03 23:15", "2025-05-03 23:45").start);
    }
}
