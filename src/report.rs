//! Movement report loader.
//!
//! Reads the tracking provider's CSV export and turns it into trips and
//! harsh-driving events. Rows that cannot be interpreted are skipped and
//! recorded as warnings on the returned [`MovementReport`].

use std::fs::File;
use std::io::Read;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{MetricsError, Result};
use crate::model::{Coordinate, EventKind, EventRecord, MovementReport, Sample, TripRecord};

const TRIP_START: &str = "Start up";
const TRIP_END: &str = "Ignition off";

const DATE_FORMATS: &[&str] = &["%Y/%m/%d %H:%M", "%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

static PROVIDER_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Long\s*:\s*([\d,\-]+),\s*Lat\s*:\s*([\d,\-]+)").expect("valid location regex")
});

/// One row of the export. Header names are matched case-sensitively in
/// either lower case or the provider's capitalised form.
#[derive(Debug, Deserialize)]
struct ReportRow {
    #[serde(alias = "Date")]
    date: Option<String>,
    #[serde(alias = "Event")]
    event: Option<String>,
    #[serde(alias = "Location", default)]
    location: Option<String>,
    #[serde(alias = "Speed", default, deserialize_with = "csv::invalid_option")]
    speed: Option<f64>,
    #[serde(alias = "Distance", default, deserialize_with = "csv::invalid_option")]
    distance: Option<f64>,
    #[serde(alias = "Severity", default, deserialize_with = "csv::invalid_option")]
    severity: Option<f64>,
    #[serde(alias = "SpeedLimit", default, deserialize_with = "csv::invalid_option")]
    speed_limit: Option<f64>,
    #[serde(alias = "Acceleration", default, deserialize_with = "csv::invalid_option")]
    acceleration: Option<f64>,
}

/// Parses a report timestamp in any of the accepted layouts.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
}

/// Parses `Long : 28,0456, Lat : -26,1234` (comma decimals) or `lat;lon`.
pub fn parse_location(s: &str) -> Option<Coordinate> {
    if let Some(caps) = PROVIDER_LOCATION.captures(s) {
        let lon = caps[1].replace(',', ".").parse().ok()?;
        let lat = caps[2].replace(',', ".").parse().ok()?;
        return Some(Coordinate::new(lat, lon));
    }

    let (lat, lon) = s.split_once(';')?;
    Some(Coordinate::new(
        lat.trim().parse().ok()?,
        lon.trim().parse().ok()?,
    ))
}

/// Loads a movement report from a CSV file on disk.
#[tracing::instrument]
pub fn load_report(path: &str) -> Result<MovementReport> {
    let file = File::open(path)?;
    let report = parse_report(file)?;
    info!(
        trips = report.trips.len(),
        unassigned_events = report.unassigned_events.len(),
        warnings = report.warnings.len(),
        "Report loaded"
    );
    Ok(report)
}

/// Reads report rows from any CSV source.
///
/// Only an unreadable header is an error; bad rows become warnings.
pub fn parse_report<R: Read>(reader: R) -> Result<MovementReport> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    rdr.headers()?;

    let mut builder = ReportBuilder::default();

    for (i, result) in rdr.deserialize::<ReportRow>().enumerate() {
        // Header is line 1.
        let line = i + 2;
        match result {
            Ok(row) => builder.push_row(line, row),
            Err(e) => builder.warn(MetricsError::malformed(format!("line {line}: {e}"))),
        }
    }

    Ok(builder.finish())
}

#[derive(Default)]
struct ReportBuilder {
    trips: Vec<TripRecord>,
    current: Option<TripRecord>,
    events: Vec<EventRecord>,
    warnings: Vec<String>,
}

impl ReportBuilder {
    fn warn(&mut self, err: MetricsError) {
        warn!(error = %err, "Skipping report record");
        self.warnings.push(err.to_string());
    }

    fn push_row(&mut self, line: usize, row: ReportRow) {
        let event = row.event.as_deref().unwrap_or("").trim();
        let timestamp = row.date.as_deref().and_then(parse_timestamp);
        let location = row.location.as_deref().and_then(parse_location);

        if event == TRIP_START {
            if let Some(open) = self.current.take() {
                self.trips.push(open);
            }
            if timestamp.is_none() {
                self.warn(MetricsError::malformed(format!(
                    "line {line}: trip start has no readable date"
                )));
            }
            self.current = Some(TripRecord {
                number: self.trips.len() + 1,
                start: timestamp,
                ..Default::default()
            });
            return;
        }

        if event == TRIP_END {
            let Some(mut trip) = self.current.take() else {
                self.warn(MetricsError::malformed(format!(
                    "line {line}: ignition off without a trip start"
                )));
                return;
            };
            trip.end = timestamp;
            trip.distance = match row.distance {
                Some(d) if d >= 0.0 => d,
                _ => {
                    self.warn(MetricsError::malformed(format!(
                        "line {line}: trip {} has no usable distance",
                        trip.number
                    )));
                    0.0
                }
            };
            self.trips.push(trip);
            return;
        }

        if let Some(kind) = EventKind::from_label(event) {
            let Some(timestamp) = timestamp else {
                self.warn(MetricsError::malformed(format!(
                    "line {line}: {event} has no readable date"
                )));
                return;
            };
            self.events.push(EventRecord {
                kind,
                timestamp,
                severity: row.severity,
                location,
            });
            return;
        }

        if self.current.is_none() || row.speed.is_none() {
            debug!(line, event, "Row outside a trip or without speed");
            return;
        }
        let Some(timestamp) = timestamp else {
            self.warn(MetricsError::malformed(format!(
                "line {line}: sample has no readable date"
            )));
            return;
        };
        let (Some(trip), Some(speed)) = (self.current.as_mut(), row.speed) else {
            return;
        };
        trip.samples.push(Sample {
            timestamp,
            speed,
            acceleration: row.acceleration,
            location,
            speed_limit: row.speed_limit,
        });
    }

    fn finish(mut self) -> MovementReport {
        if let Some(open) = self.current.take() {
            self.trips.push(open);
        }

        for trip in &mut self.trips {
            trip.samples.sort_by_key(|s| s.timestamp);
        }

        let unassigned_events = attach_events(&mut self.trips, self.events);

        MovementReport {
            trips: self.trips,
            unassigned_events,
            warnings: self.warnings,
        }
    }
}

/// Moves each event onto the first well-formed trip whose span contains it.
/// Returns the events no trip contains.
pub fn attach_events(trips: &mut [TripRecord], events: Vec<EventRecord>) -> Vec<EventRecord> {
    let spans: Vec<_> = trips.iter().map(|t| t.span().ok()).collect();
    let mut unassigned = Vec::new();

    for event in events {
        let owner = spans
            .iter()
            .position(|s| s.is_some_and(|s| s.contains(event.timestamp)));
        match owner {
            Some(i) => trips[i].events.push(event),
            None => unassigned.push(event),
        }
    }

    unassigned
}
