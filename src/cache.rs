//! Per-run speed-limit cache in front of a [`SpeedLimitLookup`].
//!
//! Both hits and misses are remembered, so every segment reaches the
//! external service at most once per run. Nothing is ever evicted.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::services::speed_limit::{SegmentKey, SpeedLimitLookup};

pub struct SpeedLimitCache {
    lookup: Option<Arc<dyn SpeedLimitLookup>>,
    entries: HashMap<SegmentKey, Option<f64>>,
    calls: usize,
}

impl SpeedLimitCache {
    pub fn new(lookup: Arc<dyn SpeedLimitLookup>) -> Self {
        Self {
            lookup: Some(lookup),
            entries: HashMap::new(),
            calls: 0,
        }
    }

    /// A cache with no backing service; every unseen segment stays unknown.
    pub fn disabled() -> Self {
        Self {
            lookup: None,
            entries: HashMap::new(),
            calls: 0,
        }
    }

    /// Seeds a known limit, e.g. from a previous run.
    pub fn insert(&mut self, key: SegmentKey, limit: Option<f64>) {
        self.entries.insert(key, limit);
    }

    /// Cached limit for `key`. The outer `None` means never resolved.
    pub fn get(&self, key: &SegmentKey) -> Option<Option<f64>> {
        self.entries.get(key).copied()
    }

    /// Number of calls made to the backing service so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys from `keys` that have no cache entry yet.
    pub fn missing<'a>(&self, keys: impl IntoIterator<Item = &'a SegmentKey>) -> BTreeSet<SegmentKey> {
        keys.into_iter()
            .filter(|k| !self.entries.contains_key(k))
            .copied()
            .collect()
    }

    /// Resolves every uncached key, running up to `concurrency` lookups at a
    /// time, and waits for all of them before returning.
    ///
    /// A failed or panicked lookup caches the segment as unknown.
    #[tracing::instrument(skip(self, keys))]
    pub async fn resolve_all(&mut self, keys: &BTreeSet<SegmentKey>, concurrency: usize) {
        let Some(lookup) = self.lookup.clone() else {
            return;
        };

        let pending = self.missing(keys);
        if pending.is_empty() {
            return;
        }
        debug!(segments = pending.len(), "Resolving speed limits");

        let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
        let mut tasks = Vec::with_capacity(pending.len());

        for key in pending {
            let sem = semaphore.clone();
            let lookup = lookup.clone();
            let task = tokio::spawn(async move {
                let _permit = sem.acquire().await;
                lookup.lookup(&key).await
            });
            tasks.push((key, task));
        }

        for (key, task) in tasks {
            self.calls += 1;
            let limit = match task.await {
                Ok(Ok(limit)) => {
                    if limit.is_none() {
                        debug!(segment = %key, "No speed limit known for segment");
                    }
                    limit
                }
                Ok(Err(e)) => {
                    warn!(segment = %key, error = %e, "Speed-limit lookup failed");
                    None
                }
                Err(e) => {
                    warn!(segment = %key, error = %e, "Speed-limit lookup task aborted");
                    None
                }
            };
            self.entries.insert(key, limit);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{MetricsError, Result};
    use crate::model::Coordinate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic lookup returning `limit` everywhere and counting calls.
    pub(crate) struct StubLookup {
        pub limit: Option<f64>,
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    impl StubLookup {
        pub fn returning(limit: Option<f64>) -> Self {
            Self {
                limit,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            Self {
                limit: None,
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl SpeedLimitLookup for StubLookup {
        async fn lookup(&self, _key: &SegmentKey) -> Result<Option<f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MetricsError::LookupUnavailable("stub offline".into()));
            }
            Ok(self.limit)
        }
    }

    fn key(lat: f64, lon: f64) -> SegmentKey {
        SegmentKey::from_coordinate(Coordinate::new(lat, lon))
    }

    #[tokio::test]
    async fn test_resolve_all_looks_up_each_segment_once() {
        let stub = Arc::new(StubLookup::returning(Some(60.0)));
        let mut cache = SpeedLimitCache::new(stub.clone());

        let keys: BTreeSet<_> = [key(-26.1, 28.0), key(-26.2, 28.0)].into_iter().collect();
        cache.resolve_all(&keys, 2).await;
        cache.resolve_all(&keys, 2).await;

        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.calls(), 2);
        assert_eq!(cache.get(&key(-26.1, 28.0)), Some(Some(60.0)));
    }

    #[tokio::test]
    async fn test_failed_lookup_cached_as_unknown() {
        let stub = Arc::new(StubLookup::failing());
        let mut cache = SpeedLimitCache::new(stub.clone());

        let keys: BTreeSet<_> = [key(1.0, 1.0)].into_iter().collect();
        cache.resolve_all(&keys, 1).await;
        cache.resolve_all(&keys, 1).await;

        assert_eq!(cache.get(&key(1.0, 1.0)), Some(None));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_resolves_nothing() {
        let mut cache = SpeedLimitCache::disabled();
        let keys: BTreeSet<_> = [key(1.0, 1.0)].into_iter().collect();
        cache.resolve_all(&keys, 1).await;

        assert!(cache.is_empty());
        assert_eq!(cache.get(&key(1.0, 1.0)), None);
    }

    #[test]
    fn test_seeded_entries_are_not_missing() {
        let mut cache = SpeedLimitCache::disabled();
        cache.insert(key(1.0, 1.0), Some(80.0));
        let keys = [key(1.0, 1.0), key(2.0, 2.0)];
        let missing = cache.missing(keys.iter());
        assert_eq!(missing.len(), 1);
        assert!(missing.contains(&key(2.0, 2.0)));
    }
}
