//! Aggregator configuration.
//!
//! Loaded from a JSON file; every field is optional and falls back to the
//! defaults below:
//! ```json
//! {
//!   "use_external_speed_lookup": true,
//!   "night_window_start": "23:00",
//!   "night_window_end": "04:30",
//!   "harsh_event_debounce_secs": 120,
//!   "night_hourly_weights": { "23": 2.0, "0": 4.0, "1": 6.0 }
//! }
//! ```

use std::collections::BTreeMap;

use chrono::NaiveTime;
use serde::Deserialize;

use crate::error::{MetricsError, Result};
use crate::model::EventKind;
use crate::period::PeriodMode;

/// Points awarded for one speed violation whose excess over the limit is at
/// most `max_excess`. A tier without `max_excess` catches everything above.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpeedPenaltyTier {
    pub max_excess: Option<f64>,
    pub points: f64,
}

/// Points per counted harsh event, by kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViolationWeights {
    pub harsh_brake: f64,
    pub harsh_accel: f64,
    pub harsh_corner: f64,
}

impl Default for ViolationWeights {
    fn default() -> Self {
        Self {
            harsh_brake: 8.0,
            harsh_accel: 8.0,
            harsh_corner: 8.0,
        }
    }
}

impl ViolationWeights {
    pub fn for_kind(&self, kind: EventKind) -> f64 {
        match kind {
            EventKind::HarshBrake => self.harsh_brake,
            EventKind::HarshAccel => self.harsh_accel,
            EventKind::HarshCorner => self.harsh_corner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub use_external_speed_lookup: bool,
    #[serde(with = "hhmm")]
    pub night_window_start: NaiveTime,
    #[serde(with = "hhmm")]
    pub night_window_end: NaiveTime,
    pub harsh_brake_threshold: f64,
    pub harsh_accel_threshold: f64,
    pub harsh_corner_threshold: f64,
    /// Harsh events of one kind closer together than this are one event. 0 disables.
    pub harsh_event_debounce_secs: u64,
    pub speed_tolerance: f64,
    pub night_penalty_weight: f64,
    /// Hour of day (0-23) to weight, overriding `night_penalty_weight`.
    pub night_hourly_weights: BTreeMap<u32, f64>,
    pub violation_weights: ViolationWeights,
    pub speed_penalty_tiers: Vec<SpeedPenaltyTier>,
    /// Limit assumed when neither the report nor the lookup provides one.
    pub default_speed_limit: Option<f64>,
    /// Samples below this speed are never checked against a limit.
    pub min_checked_speed: f64,
    pub lookup_concurrency: usize,
    /// Skip the external lookup entirely when more segments than this need resolving.
    pub max_external_lookups: Option<usize>,
    pub period_mode: PeriodMode,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            use_external_speed_lookup: false,
            night_window_start: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
            night_window_end: NaiveTime::from_hms_opt(5, 0, 0).unwrap_or_default(),
            harsh_brake_threshold: 0.0,
            harsh_accel_threshold: 0.0,
            harsh_corner_threshold: 0.0,
            harsh_event_debounce_secs: 0,
            speed_tolerance: 10.0,
            night_penalty_weight: 1.0,
            night_hourly_weights: BTreeMap::new(),
            violation_weights: ViolationWeights::default(),
            speed_penalty_tiers: vec![
                SpeedPenaltyTier {
                    max_excess: Some(15.0),
                    points: 3.0,
                },
                SpeedPenaltyTier {
                    max_excess: Some(25.0),
                    points: 8.0,
                },
                SpeedPenaltyTier {
                    max_excess: None,
                    points: 15.0,
                },
            ],
            default_speed_limit: None,
            min_checked_speed: 0.0,
            lookup_concurrency: 4,
            max_external_lookups: None,
            period_mode: PeriodMode::FullMonth,
        }
    }
}

impl AggregatorConfig {
    /// Loads the config from a JSON file at `path` and validates it.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: AggregatorConfig = serde_json::from_str(content)
            .map_err(|e| MetricsError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn threshold(&self, kind: EventKind) -> f64 {
        match kind {
            EventKind::HarshBrake => self.harsh_brake_threshold,
            EventKind::HarshAccel => self.harsh_accel_threshold,
            EventKind::HarshCorner => self.harsh_corner_threshold,
        }
    }

    /// Checks every option before any aggregation runs.
    pub fn validate(&self) -> Result<()> {
        fn non_negative(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(MetricsError::invalid_config(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )))
            }
        }

        if self.night_window_start == self.night_window_end {
            return Err(MetricsError::invalid_config(
                "night window start and end must differ",
            ));
        }

        for kind in EventKind::ALL {
            non_negative(&format!("{kind:?} threshold"), self.threshold(kind))?;
            non_negative(&format!("{kind:?} weight"), self.violation_weights.for_kind(kind))?;
        }
        non_negative("speed_tolerance", self.speed_tolerance)?;
        non_negative("night_penalty_weight", self.night_penalty_weight)?;
        non_negative("min_checked_speed", self.min_checked_speed)?;
        if let Some(limit) = self.default_speed_limit {
            non_negative("default_speed_limit", limit)?;
        }

        for (hour, weight) in &self.night_hourly_weights {
            if *hour > 23 {
                return Err(MetricsError::invalid_config(format!(
                    "night_hourly_weights hour {hour} is outside 0-23"
                )));
            }
            non_negative(&format!("night weight for hour {hour}"), *weight)?;
        }

        if self.lookup_concurrency == 0 {
            return Err(MetricsError::invalid_config(
                "lookup_concurrency must be at least 1",
            ));
        }

        let mut previous: Option<f64> = None;
        for (i, tier) in self.speed_penalty_tiers.iter().enumerate() {
            non_negative("speed penalty tier points", tier.points)?;
            match tier.max_excess {
                Some(max) => {
                    non_negative("speed penalty tier max_excess", max)?;
                    if previous.is_some_and(|p| max <= p) {
                        return Err(MetricsError::invalid_config(
                            "speed_penalty_tiers must be sorted by increasing max_excess",
                        ));
                    }
                    previous = Some(max);
                }
                None if i + 1 != self.speed_penalty_tiers.len() => {
                    return Err(MetricsError::invalid_config(
                        "only the last speed penalty tier may be unbounded",
                    ));
                }
                None => {}
            }
        }

        Ok(())
    }
}

/// Serde adapter for `"HH:MM"` times.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}
