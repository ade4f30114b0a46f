//! Speed-limit violations.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::cache::SpeedLimitCache;
use crate::config::{AggregatorConfig, SpeedPenaltyTier};
use crate::metrics::types::{LimitSource, SpeedViolation, SpeedViolations};
use crate::model::{Sample, TripRecord};
use crate::services::speed_limit::SegmentKey;

/// Points for a violation exceeding the limit by `excess`: the first tier
/// whose `max_excess` is at least `excess`, or zero past the last bounded tier.
pub fn tier_points(excess: f64, tiers: &[SpeedPenaltyTier]) -> f64 {
    tiers
        .iter()
        .find(|t| t.max_excess.is_none_or(|max| excess <= max))
        .map_or(0.0, |t| t.points)
}

/// Samples fast enough to be worth checking, paired with their trip number.
fn candidates<'a>(
    trips: &'a [TripRecord],
    config: &'a AggregatorConfig,
) -> impl Iterator<Item = (usize, &'a Sample)> + 'a {
    trips
        .iter()
        .filter(|t| t.span().is_ok())
        .flat_map(|t| t.samples.iter().map(move |s| (t.number, s)))
        .filter(move |(_, s)| s.speed >= config.min_checked_speed)
}

/// Checks every in-trip sample against its legal limit.
///
/// The limit comes from the report when embedded, otherwise from the cached
/// external lookup when enabled, otherwise from `default_speed_limit`. A
/// sample with no determinable limit is counted as unknown and never as a
/// violation. All segment lookups complete before any sample is judged.
pub async fn count_speed_violations(
    trips: &[TripRecord],
    cache: &mut SpeedLimitCache,
    config: &AggregatorConfig,
) -> SpeedViolations {
    let mut result = SpeedViolations::default();
    let calls_before = cache.calls();

    let mut use_lookup = config.use_external_speed_lookup;
    if use_lookup {
        let keys: BTreeSet<SegmentKey> = candidates(trips, config)
            .filter(|(_, s)| s.speed_limit.is_none())
            .filter_map(|(_, s)| s.location.map(SegmentKey::from))
            .collect();
        let pending = cache.missing(&keys).len();

        match config.max_external_lookups {
            Some(max) if pending > max => {
                warn!(
                    pending,
                    max, "Too many segments to look up, using the default speed limit instead"
                );
                use_lookup = false;
                result.lookup_skipped = true;
            }
            _ => cache.resolve_all(&keys, config.lookup_concurrency).await,
        }
    }

    for (trip, sample) in candidates(trips, config) {
        result.checked_samples += 1;

        let resolved = match sample.speed_limit {
            Some(limit) => Some((limit, LimitSource::Embedded)),
            None if use_lookup => sample
                .location
                .and_then(|c| cache.get(&SegmentKey::from(c)).flatten())
                .map(|limit| (limit, LimitSource::Lookup)),
            None => config
                .default_speed_limit
                .map(|limit| (limit, LimitSource::Default)),
        };

        let Some((limit, limit_source)) = resolved else {
            debug!(trip, timestamp = %sample.timestamp, "No speed limit for sample");
            result.unknown_limit_samples += 1;
            continue;
        };

        let excess = sample.speed - limit;
        if excess <= config.speed_tolerance {
            continue;
        }

        let points = tier_points(excess, &config.speed_penalty_tiers);
        debug!(
            trip,
            timestamp = %sample.timestamp,
            speed = sample.speed,
            limit,
            points,
            "Speed violation"
        );
        result.penalty_points += points;
        result.violations.push(SpeedViolation {
            trip,
            timestamp: sample.timestamp,
            speed: sample.speed,
            limit,
            excess,
            acceleration: sample.acceleration,
            limit_source,
            points,
        });
    }

    result.lookup_calls = cache.calls() - calls_before;
    info!(
        violations = result.count(),
        checked = result.checked_samples,
        unknown = result.unknown_limit_samples,
        lookup_calls = result.lookup_calls,
        points = result.penalty_points,
        "Speed violations counted"
    );
    result
}
