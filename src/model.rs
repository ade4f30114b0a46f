//! Trip and event records produced by the report loader.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A single reading taken while the vehicle was moving.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: NaiveDateTime,
    pub speed: f64,
    pub acceleration: Option<f64>,
    pub location: Option<Coordinate>,
    /// Legal limit shipped with the report itself, when the provider has one.
    pub speed_limit: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    HarshBrake,
    HarshAccel,
    HarshCorner,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::HarshBrake,
        EventKind::HarshAccel,
        EventKind::HarshCorner,
    ];

    /// Maps the event label used by the tracking provider.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Harsh Braking" => Some(EventKind::HarshBrake),
            "Harsh Acceleration" => Some(EventKind::HarshAccel),
            "Harsh Cornering" => Some(EventKind::HarshCorner),
            _ => None,
        }
    }
}

/// A harsh-behaviour flag raised by the tracking unit.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub kind: EventKind,
    pub timestamp: NaiveDateTime,
    /// `None` when the device flags the event without grading it.
    pub severity: Option<f64>,
    pub location: Option<Coordinate>,
}

/// Start and end of a well-formed trip, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripSpan {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TripSpan {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t <= self.end
    }

    /// Calendar dates the span touches, with the end treated as exclusive.
    ///
    /// A zero-length span still touches its start date.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let first = self.start.date();
        let mut last = self.end.date();
        if self.end > self.start && self.end.time() == NaiveTime::MIN {
            last = last.pred_opt().unwrap_or(last);
        }

        first
            .iter_days()
            .take_while(|d| *d <= last)
            .collect()
    }
}

/// One ignition-on to ignition-off trip.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TripRecord {
    /// Position of the trip in the report, starting at 1.
    pub number: usize,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    /// Distance as reported, in the report's own unit.
    pub distance: f64,
    pub samples: Vec<Sample>,
    pub events: Vec<EventRecord>,
}

impl TripRecord {
    /// Returns the trip's time span, or a `MalformedRecord` error when a
    /// timestamp is missing or the trip ends before it starts.
    pub fn span(&self) -> Result<TripSpan> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start <= end => Ok(TripSpan { start, end }),
            (Some(start), Some(end)) => Err(MetricsError::malformed(format!(
                "trip {} ends ({end}) before it starts ({start})",
                self.number
            ))),
            (None, _) => Err(MetricsError::malformed(format!(
                "trip {} has no start timestamp",
                self.number
            ))),
            (_, None) => Err(MetricsError::malformed(format!(
                "trip {} has no end timestamp",
                self.number
            ))),
        }
    }
}

/// A parsed movement report for one vehicle.
#[derive(Debug, Clone, Default)]
pub struct MovementReport {
    pub trips: Vec<TripRecord>,
    /// Events whose timestamp falls outside every trip.
    pub unassigned_events: Vec<EventRecord>,
    pub warnings: Vec<String>,
}

impl MovementReport {
    /// Every event in the report, attached or not.
    pub fn events(&self) -> impl Iterator<Item = &EventRecord> {
        self.trips
            .iter()
            .flat_map(|t| t.events.iter())
            .chain(self.unassigned_events.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_span_requires_both_timestamps() {
        let trip = TripRecord {
            number: 3,
            start: Some(at("2025-05-01 08:00")),
            end: None,
            ..Default::default()
        };
        assert!(trip.span().is_err());
    }

    #[test]
    fn test_span_rejects_inverted_trip() {
        let trip = TripRecord {
            number: 1,
            start: Some(at("2025-05-01 09:00")),
            end: Some(at("2025-05-01 08:00")),
            ..Default::default()
        };
        let err = trip.span().unwrap_err();
        assert!(err.to_string().contains("trip 1 ends"));
    }

    #[test]
    fn test_dates_for_overnight_trip() {
        let span = TripSpan {
            start: at("2025-05-01 23:30"),
            end: at("2025-05-02 00:30"),
        };
        let dates = span.dates();
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[1], NaiveDate::from_ymd_opt(2025, 5, 2).unwrap());
    }

    #[test]
    fn test_dates_end_at_midnight_is_exclusive() {
        let span = TripSpan {
            start: at("2025-05-01 23:00"),
            end: at("2025-05-02 00:00"),
        };
        assert_eq!(span.dates(), vec![NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()]);
    }

    #[test]
    fn test_event_kind_labels() {
        assert_eq!(EventKind::from_label("Harsh Braking"), Some(EventKind::HarshBrake));
        assert_eq!(EventKind::from_label(" Harsh Cornering "), Some(EventKind::HarshCorner));
        assert_eq!(EventKind::from_label("Speed Violation"), None);
    }
}
