use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// A size-bounded map whose entries expire after a fixed time-to-live.
///
/// The cache is a plain owned value: whoever builds a service creates one
/// and hands it in (usually behind a `Mutex`). When full, the oldest
/// insertion is evicted first.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use vitalwatch_common::cache::BoundedCache;
///
/// let now = Utc::now();
/// let mut cache = BoundedCache::new(2, 60);
/// cache.insert("a", 1, now);
/// cache.insert("b", 2, now);
/// cache.insert("c", 3, now);
/// assert_eq!(cache.get(&"a", now), None);
/// assert_eq!(cache.get(&"c", now), Some(3));
/// assert_eq!(cache.get(&"c", now + Duration::seconds(61)), None);
/// ```
pub struct BoundedCache<K, V> {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<K, (V, DateTime<Utc>)>,
    order: VecDeque<K>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl_secs: u64) -> Self {
        Self {
            capacity,
            ttl: Duration::seconds(ttl_secs as i64),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a live entry, dropping it if it has expired.
    pub fn get(&mut self, key: &K, now: DateTime<Utc>) -> Option<V> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some((_, inserted)) => now - *inserted >= self.ttl,
        };
        if expired {
            self.remove(key);
            return None;
        }
        self.entries.get(key).map(|(v, _)| v.clone())
    }

    pub fn insert(&mut self, key: K, value: V, now: DateTime<Utc>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        }
        self.evict_expired(now);
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, (value, now));
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.entries.remove(key).map(|(v, _)| v);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.entries.retain(|_, (_, inserted)| now - *inserted < ttl);
        let entries = &self.entries;
        self.order.retain(|k| entries.contains_key(k));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_capacity() {
        let now = Utc::now();
        let mut cache = BoundedCache::new(3, 600);
        for i in 0..10 {
            cache.insert(i, i * 10, now);
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.get(&9, now), Some(90));
        assert_eq!(cache.get(&6, now), None);
    }

    #[test]
    fn reinsert_refreshes_position() {
        let now = Utc::now();
        let mut cache = BoundedCache::new(2, 600);
        cache.insert("a", 1, now);
        cache.insert("b", 2, now);
        cache.insert("a", 3, now);
        cache.insert("c", 4, now);
        assert_eq!(cache.get(&"a", now), Some(3));
        assert_eq!(cache.get(&"b", now), None);
    }

    #[test]
    fn expired_entries_make_room() {
        let now = Utc::now();
        let mut cache = BoundedCache::new(2, 10);
        cache.insert("a", 1, now);
        cache.insert("b", 2, now + Duration::seconds(5));
        cache.insert("c", 3, now + Duration::seconds(11));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"b", now + Duration::seconds(11)), Some(2));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let now = Utc::now();
        let mut cache = BoundedCache::new(0, 10);
        cache.insert("a", 1, now);
        assert!(cache.is_empty());
    }
}
