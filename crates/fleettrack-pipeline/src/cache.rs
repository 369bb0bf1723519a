//! Latest-Position Cache
//!
//! Time-bounded map from driver to most recent position sample. Absorbs the
//! write burst from ingestion and serves fast reads; holds no durability
//! guarantee. Losing its entire state is harmless because every read path
//! falls back to the durable store.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fleettrack_core::types::{DriverId, PositionSample};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

/// A cached sample and its expiry deadline.
#[derive(Debug, Clone)]
struct CachedPosition {
    sample: PositionSample,
    expires_at: Instant,
}

/// In-process cache of the latest known position per driver.
pub struct PositionCache {
    entries: DashMap<DriverId, CachedPosition>,
    ttl: Duration,
}

impl PositionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Stores the sample as the driver's latest position, unless an existing
    /// entry carries a strictly newer `observed_at`. The newest sample by
    /// observation time always wins, regardless of arrival order; ties go to
    /// the arriving sample.
    ///
    /// Returns whether the sample was stored.
    pub fn put(&self, sample: PositionSample) -> bool {
        let expires_at = Instant::now() + self.ttl;

        match self.entries.entry(sample.driver_id.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().sample.observed_at > sample.observed_at {
                    debug!(
                        driver_id = %sample.driver_id,
                        "out-of-order sample suppressed"
                    );
                    return false;
                }
                occupied.insert(CachedPosition { sample, expires_at });
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CachedPosition { sample, expires_at });
                true
            }
        }
    }

    /// Returns the cached sample when present and not yet expired. An
    /// expired entry is evicted on the spot and treated as absent; the
    /// caller falls back to the durable store.
    pub fn get(&self, driver_id: &str) -> Option<PositionSample> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(driver_id) {
            if entry.expires_at > now {
                return Some(entry.sample.clone());
            }
        }

        // Evict only if still expired, so a concurrent fresh put survives.
        self.entries
            .remove_if(driver_id, |_, cached| cached.expires_at <= now);
        None
    }

    /// Drops every expired entry. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, cached| cached.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawns the periodic expiry sweep. Abort the handle on shutdown.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = self;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(
                        removed,
                        remaining = cache.len(),
                        "position cache sweep completed"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};

    fn sample(driver: &str, lat: f64, offset_secs: i64) -> PositionSample {
        PositionSample {
            driver_id: driver.to_string(),
            latitude: lat,
            longitude: -73.0,
            heading: None,
            speed: None,
            accuracy: None,
            battery_level: None,
            order_id: None,
            observed_at: Utc::now() + TimeDelta::seconds(offset_secs),
        }
    }

    #[test]
    fn test_put_and_get() {
        let cache = PositionCache::new(Duration::from_secs(60));
        assert!(cache.put(sample("d1", 40.0, 0)));

        let got = cache.get("d1").unwrap();
        assert_eq!(got.latitude, 40.0);
        assert!(cache.get("d2").is_none());
    }

    #[test]
    fn test_older_sample_never_overwrites_newer() {
        let cache = PositionCache::new(Duration::from_secs(60));

        assert!(cache.put(sample("d1", 41.0, 10)));
        // Arrives later, observed earlier.
        assert!(!cache.put(sample("d1", 40.0, 0)));

        assert_eq!(cache.get("d1").unwrap().latitude, 41.0);
    }

    #[test]
    fn test_equal_timestamp_goes_to_arrival_order() {
        let cache = PositionCache::new(Duration::from_secs(60));
        let first = sample("d1", 40.0, 0);
        let mut second = first.clone();
        second.latitude = 41.0;

        cache.put(first);
        assert!(cache.put(second));
        assert_eq!(cache.get("d1").unwrap().latitude, 41.0);
    }

    #[test]
    fn test_expiry_enforced_on_read() {
        let cache = PositionCache::new(Duration::from_millis(30));
        cache.put(sample("d1", 40.0, 0));

        assert!(cache.get("d1").is_some());
        std::thread::sleep(Duration::from_millis(50));

        // No intervening write; the read itself evicts.
        assert!(cache.get("d1").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_refresh_extends_lifetime() {
        let cache = PositionCache::new(Duration::from_millis(60));
        cache.put(sample("d1", 40.0, 0));

        std::thread::sleep(Duration::from_millis(40));
        cache.put(sample("d1", 40.5, 1));
        std::thread::sleep(Duration::from_millis(40));

        // The refresh restarted the clock.
        assert_eq!(cache.get("d1").unwrap().latitude, 40.5);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let cache = PositionCache::new(Duration::from_millis(30));
        cache.put(sample("stale", 40.0, 0));

        std::thread::sleep(Duration::from_millis(50));
        cache.put(sample("fresh", 41.0, 0));

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("fresh").is_some());
    }
}
