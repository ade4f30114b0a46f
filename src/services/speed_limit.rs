//! Trait and key type for resolving legal road speed limits.

use std::fmt;

use crate::error::Result;
use crate::model::Coordinate;

/// Decimal places coordinates are rounded to when forming a [`SegmentKey`].
///
/// Four places is roughly 11 m of latitude, close enough that two samples on
/// the same stretch of road share a key.
pub const SEGMENT_PRECISION: u32 = 4;

const SCALE: f64 = 10_000.0;

/// A road segment identified by its rounded coordinate.
///
/// Stored as scaled integers so equal segments hash and compare exactly.
/// Rounding is half away from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentKey {
    lat_e4: i64,
    lon_e4: i64,
}

impl SegmentKey {
    pub fn from_coordinate(c: Coordinate) -> Self {
        Self {
            lat_e4: (c.latitude * SCALE).round() as i64,
            lon_e4: (c.longitude * SCALE).round() as i64,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.lat_e4 as f64 / SCALE
    }

    pub fn longitude(&self) -> f64 {
        self.lon_e4 as f64 / SCALE
    }
}

impl From<Coordinate> for SegmentKey {
    fn from(c: Coordinate) -> Self {
        Self::from_coordinate(c)
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = SEGMENT_PRECISION as usize;
        write!(f, "{:.p$},{:.p$}", self.latitude(), self.longitude())
    }
}

/// Source of legal speed limits for a road segment.
///
/// `Ok(None)` means the provider knows of no limit there;
/// `Err(MetricsError::LookupUnavailable)` means it could not be asked.
/// Both leave the limit unknown.
#[async_trait::async_trait]
pub trait SpeedLimitLookup: Send + Sync {
    async fn lookup(&self, key: &SegmentKey) -> Result<Option<f64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearby_points_share_a_key() {
        let a = SegmentKey::from_coordinate(Coordinate::new(-26.123_41, 28.045_62));
        let b = SegmentKey::from_coordinate(Coordinate::new(-26.123_44, 28.045_58));
        assert_eq!(a, b);
    }

    #[test]
    fn test_distant_points_differ() {
        let a = SegmentKey::from_coordinate(Coordinate::new(-26.1234, 28.0456));
        let b = SegmentKey::from_coordinate(Coordinate::new(-26.1236, 28.0456));
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_uses_fixed_precision() {
        let key = SegmentKey::from_coordinate(Coordinate::new(-26.2, 28.04567));
        assert_eq!(key.to_string(), "-26.2000,28.0457");
    }
}
