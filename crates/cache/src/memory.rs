//! Bounded in-memory LRU tier.
//!
//! First stop for every lookup. Shared across extraction tasks, so the
//! whole structure sits behind one mutex; entries are small strings and
//! every operation is a few map/deque touches, so contention is not a
//! concern at the permitted fetch concurrency.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Entries kept before the least-recently-used one is dropped.
pub const MEMORY_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, String>,
    // Recency order, most recent at the back.
    order: VecDeque<String>,
}

/// A bounded LRU map from locator to prompt text.
#[derive(Debug)]
pub struct MemoryCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(MEMORY_CAPACITY)
    }
}

impl MemoryCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { inner: Mutex::new(Inner::default()), capacity: capacity.max(1) }
    }

    /// Look up a prompt, marking the entry as most recently used.
    pub fn get(&self, locator: &str) -> Option<String> {
        let mut inner = self.lock();
        let value = inner.entries.get(locator).cloned()?;
        touch(&mut inner.order, locator);
        Some(value)
    }

    /// Insert or refresh an entry, evicting the least recently used one
    /// when over capacity.
    pub fn put(&self, locator: &str, prompt: &str) {
        let mut inner = self.lock();
        inner.entries.insert(locator.to_string(), prompt.to_string());
        touch(&mut inner.order, locator);
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves only stale cache entries;
        // the map itself can't be left mid-update.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn touch(order: &mut VecDeque<String>, locator: &str) {
    if let Some(at) = order.iter().position(|key| key == locator) {
        order.remove(at);
    }
    order.push_back(locator.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_miss_and_hit() {
        let cache = MemoryCache::default();
        assert_eq!(cache.get("a"), None);
        cache.put("a", "prompt a");
        assert_eq!(cache.get("a").as_deref(), Some("prompt a"));
    }

    #[test]
    fn test_put_refreshes_value() {
        let cache = MemoryCache::default();
        cache.put("a", "old");
        cache.put("a", "new");
        assert_eq!(cache.get("a").as_deref(), Some("new"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cache = MemoryCache::with_capacity(2);
        cache.put("a", "1");
        cache.put("b", "2");
        // Touch "a" so "b" becomes the eviction victim.
        cache.get("a");
        cache.put("c", "3");
        assert_eq!(cache.get("b"), None);
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_capacity_is_enforced() {
        let cache = MemoryCache::with_capacity(8);
        for i in 0..50 {
            cache.put(&format!("key-{i}"), "v");
        }
        assert_eq!(cache.len(), 8);
        assert!(cache.get("key-49").is_some());
        assert_eq!(cache.get("key-0"), None);
    }
}
