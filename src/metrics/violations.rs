use std::collections::BTreeMap;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::debug;

use crate::config::AggregatorConfig;
use crate::metrics::types::ViolationCounts;
use crate::model::{EventKind, EventRecord};

/// Whether an event is over its threshold. Ungraded events always are.
fn exceeds(severity: Option<f64>, threshold: f64) -> bool {
    severity.is_none_or(|s| s > threshold)
}

/// Counts harsh events per kind whose severity is strictly above the kind's
/// threshold, and scores them with the kind's weight.
///
/// With a non-zero debounce window, an event no more than that many seconds
/// after the previous over-threshold event of the same kind is treated as a
/// repeat report and dropped.
pub fn count_driving_violations<'a>(
    events: impl IntoIterator<Item = &'a EventRecord>,
    config: &AggregatorConfig,
) -> ViolationCounts {
    let mut by_kind: BTreeMap<EventKind, Vec<NaiveDateTime>> = BTreeMap::new();
    for e in events {
        if exceeds(e.severity, config.threshold(e.kind)) {
            by_kind.entry(e.kind).or_default().push(e.timestamp);
        }
    }

    let window = i64::try_from(config.harsh_event_debounce_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX);
    let mut counts = ViolationCounts::default();

    for (kind, mut times) in by_kind {
        times.sort();

        let mut previous: Option<NaiveDateTime> = None;
        for t in times {
            let repeat = window > TimeDelta::zero() && previous.is_some_and(|p| t - p <= window);
            previous = Some(t);

            if repeat {
                counts.suppressed_duplicates += 1;
                continue;
            }
            *counts.get_mut(kind) += 1;
            counts.penalty_points += config.violation_weights.for_kind(kind);
        }

        debug!(?kind, count = counts.get(kind), "Harsh events counted");
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, time: &str, severity: Option<f64>) -> EventRecord {
        EventRecord {
            kind,
            timestamp: NaiveDateTime::parse_from_str(time, "%Y-%m-%d %H:%M:%S%.f").unwrap(),
            severity,
            location: None,
        }
    }

    fn config() -> AggregatorConfig {
        AggregatorConfig {
            harsh_brake_threshold: 0.5,
            harsh_accel_threshold: 0.3,
            harsh_corner_threshold: 0.4,
            ..Default::default()
        }
    }

    #[test]
    fn test_threshold_is_strict() {
        let events = vec![
            event(EventKind::HarshBrake, "2025-05-01 08:00:00", Some(0.5)),
            event(EventKind::HarshBrake, "2025-05-01 09:00:00", Some(0.51)),
            event(EventKind::HarshBrake, "2025-05-01 10:00:00", Some(0.2)),
        ];
        let counts = count_driving_violations(&events, &config());
        assert_eq!(counts.harsh_brake, 1);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn test_groups_by_kind_and_scores() {
        let events = vec![
            event(EventKind::HarshBrake, "2025-05-01 08:00:00", Some(0.9)),
            event(EventKind::HarshAccel, "2025-05-02 08:00:00", Some(0.9)),
            event(EventKind::HarshAccel, "2025-05-03 08:00:00", Some(0.9)),
            event(EventKind::HarshCorner, "2025-05-04 08:00:00", None),
        ];
        let counts = count_driving_violations(&events, &config());
        assert_eq!(counts.harsh_brake, 1);
        assert_eq!(counts.harsh_accel, 2);
        assert_eq!(counts.harsh_corner, 1);
        assert_eq!(counts.penalty_points, 32.0);
    }

    #[test]
    fn test_debounce_drops_repeats_within_window() {
        let events = vec![
            event(EventKind::HarshBrake, "2025-05-01 08:00:00", Some(0.9)),
            event(EventKind::HarshBrake, "2025-05-01 08:01:30", Some(0.9)),
            event(EventKind::HarshBrake, "2025-05-01 08:03:00", Some(0.9)),
            event(EventKind::HarshBrake, "2025-05-01 08:10:00", Some(0.9)),
            // Other kinds have their own window.
            event(EventKind::HarshAccel, "2025-05-01 08:00:10", Some(0.9)),
        ];
        let config = AggregatorConfig {
            harsh_event_debounce_secs: 120,
            ..config()
        };
        let counts = count_driving_violations(&events, &config);
        assert_eq!(counts.harsh_brake, 2);
        assert_eq!(counts.harsh_accel, 1);
        assert_eq!(counts.suppressed_duplicates, 2);
    }

    #[test]
    fn test_debounce_window_keeps_subsecond_gaps() {
        let events = vec![
            event(EventKind::HarshBrake, "2025-05-01 08:00:00", Some(0.9)),
            event(EventKind::HarshBrake, "2025-05-01 08:02:00.500", Some(0.9)),
            event(EventKind::HarshAccel, "2025-05-01 09:00:00", Some(0.9)),
            event(EventKind::HarshAccel, "2025-05-01 09:02:00", Some(0.9)),
        ];
        let config = AggregatorConfig {
            harsh_event_debounce_secs: 120,
            ..config()
        };
        let counts = count_driving_violations(&events, &config);
        // 120.5 s apart is a new event; exactly 120 s is a repeat.
        assert_eq!(counts.harsh_brake, 2);
        assert_eq!(counts.harsh_accel, 1);
        assert_eq!(counts.suppressed_duplicates, 1);
    }

    #[test]
    fn test_no_debounce_by_default() {
        let events = vec![
            event(EventKind::HarshCorner, "2025-05-01 08:00:00", Some(0.9)),
            event(EventKind::HarshCorner, "2025-05-01 08:00:00", Some(0.9)),
        ];
        let counts = count_driving_violations(&events, &config());
        assert_eq!(counts.harsh_corner, 2);
    }
}
