// src/ttl_cache.rs
//! Time-bounded key/value store. Expiry is evaluated against an injected [`Clock`].

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use crate::clock::SharedClock;

struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

pub struct TtlCache<K, V> {
    ttl: ChronoDuration,
    clock: SharedClock,
    inner: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// `ttl` <= 0 means every entry is already expired on insert.
    pub fn new(ttl: ChronoDuration, clock: SharedClock) -> Self {
        Self {
            ttl,
            clock,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match map.get(key) {
            Some(e) if e.expires_at > now => Some(e.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or refresh `key`. Expired entries are swept first, so keys that are
    /// written once and never read again do not accumulate.
    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.retain(|_, e| e.expires_at > now);
        map.insert(key, Entry { value, expires_at });
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.remove(key).map(|e| e.value)
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let before = map.len();
        map.retain(|_, e| e.expires_at > now);
        before - map.len()
    }

    /// Entry count, including expired entries not yet purged.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn setup() -> (Arc<ManualClock>, TtlCache<String, u32>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap(),
        ));
        let cache = TtlCache::new(ChronoDuration::seconds(60), clock.clone());
        (clock, cache)
    }

    #[test]
    fn entry_visible_until_ttl_elapses() {
        let (clock, cache) = setup();
        cache.insert("a".into(), 1);

        clock.advance(ChronoDuration::seconds(59));
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        clock.advance(ChronoDuration::seconds(1));
        assert_eq!(cache.get(&"a".to_string()), None);
        // expired entry removed lazily on read
        assert!(cache.is_empty());
    }

    #[test]
    fn reinsert_refreshes_expiry() {
        let (clock, cache) = setup();
        cache.insert("a".into(), 1);
        clock.advance(ChronoDuration::seconds(45));
        cache.insert("a".into(), 2);
        clock.advance(ChronoDuration::seconds(45));
        assert_eq!(cache.get(&"a".to_string()), Some(2));
    }

    #[test]
    fn purge_drops_only_expired() {
        let (clock, cache) = setup();
        cache.insert("old".into(), 1);
        clock.advance(ChronoDuration::seconds(30));
        cache.insert("new".into(), 2);
        clock.advance(ChronoDuration::seconds(31));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.remove(&"new".to_string()), Some(2));
    }

    #[test]
    fn write_once_keys_do_not_accumulate() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap(),
        ));
        let cache = TtlCache::new(ChronoDuration::hours(24), clock.clone());

        for day in 0..30 {
            for i in 0..100 {
                cache.insert(format!("{day}-{i}"), i);
            }
            assert!(cache.len() <= 100, "day {day}: {} entries", cache.len());
            clock.advance(ChronoDuration::hours(25));
        }
    }

    #[test]
    fn huge_ttl_saturates_instead_of_overflowing() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap(),
        ));
        let cache = TtlCache::new(ChronoDuration::MAX, clock.clone());
        cache.insert("k".to_string(), 7);

        clock.advance(ChronoDuration::days(365 * 100));
        assert_eq!(cache.get(&"k".to_string()), Some(7));
    }
}
