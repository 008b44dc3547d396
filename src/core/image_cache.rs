//! # Image Cache
//!
//! Bounded, least-recently-used store for downloaded posters.
//!
//! ```text
//! entries: HashMap<key, (blob, tick)>     order: BTreeMap<tick, key>
//!                                                 oldest ──▶ newest
//! ```
//!
//! Every touch moves an entry to a fresh tick, so the first key in `order`
//! is always the eviction candidate. Both bounds (entry count and accounted
//! bytes) are restored before `put` releases the lock.

use log::debug;
use reqwest::Url;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::remote::ImageBlob;

pub const DEFAULT_MAX_ENTRIES: usize = 50;
pub const DEFAULT_MAX_BYTES: usize = 27 * 1024 * 1024;

struct CacheSlot {
    blob: ImageBlob,
    tick: u64,
}

#[derive(Default)]
struct LruState {
    entries: HashMap<String, CacheSlot>,
    order: BTreeMap<u64, String>,
    next_tick: u64,
    total_bytes: usize,
}

impl LruState {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &str) -> Option<CacheSlot> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.tick);
        self.total_bytes -= slot.blob.byte_size();
        Some(slot)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        if let Some(slot) = self.entries.remove(&key) {
            self.total_bytes -= slot.blob.byte_size();
        }
        Some(key)
    }
}

/// Canonical form of an image locator: parsed and re-serialized (lowercase
/// scheme and host), fragment dropped. Unparseable input is only trimmed.
pub fn normalize_key(locator: &str) -> String {
    let trimmed = locator.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

pub struct ImageCache {
    max_entries: usize,
    max_bytes: usize,
    state: Mutex<LruState>,
}

impl ImageCache {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            max_entries,
            max_bytes,
            state: Mutex::new(LruState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns the blob and marks it most recently used.
    pub fn get(&self, locator: &str) -> Option<ImageBlob> {
        let key = normalize_key(locator);
        let mut state = self.lock();
        if !state.entries.contains_key(&key) {
            return None;
        }
        let tick = state.bump();
        let slot = state.entries.get_mut(&key)?;
        let old_tick = std::mem::replace(&mut slot.tick, tick);
        let blob = slot.blob.clone();
        state.order.remove(&old_tick);
        state.order.insert(tick, key);
        Some(blob)
    }

    /// Looks without touching recency.
    pub fn contains(&self, locator: &str) -> bool {
        self.lock().entries.contains_key(&normalize_key(locator))
    }

    /// Inserts or refreshes `locator` as most recently used, then evicts
    /// from the old end until both bounds hold.
    ///
    /// A blob that alone exceeds the byte bound is refused and `false`
    /// returned; the cache is left as it was.
    pub fn put(&self, locator: &str, blob: ImageBlob) -> bool {
        let size = blob.byte_size();
        if size > self.max_bytes || self.max_entries == 0 {
            debug!("Not caching {} ({} bytes exceeds cache bound)", locator, size);
            return false;
        }

        let key = normalize_key(locator);
        let mut state = self.lock();
        state.remove(&key);

        let tick = state.bump();
        state.total_bytes += size;
        state.order.insert(tick, key.clone());
        state.entries.insert(key, CacheSlot { blob, tick });

        while state.entries.len() > self.max_entries || state.total_bytes > self.max_bytes {
            match state.evict_oldest() {
                Some(evicted) => debug!("Cache full, evicting oldest image: {}", evicted),
                None => break,
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.lock().total_bytes
    }

    /// Keys from least to most recently used.
    #[cfg(test)]
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.lock().order.values().cloned().collect()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        *state = LruState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ImageFormat;
    use std::sync::Arc;

    fn blob(size: usize) -> ImageBlob {
        ImageBlob::new(ImageFormat::Jpeg, vec![0u8; size])
    }

    fn url(i: usize) -> String {
        format!("https://image.tmdb.org/t/p/w500/{i}.jpg")
    }

    #[test]
    fn test_fifty_first_key_evicts_least_recent() {
        let cache = ImageCache::new(DEFAULT_MAX_ENTRIES, DEFAULT_MAX_BYTES);
        for i in 0..50 {
            assert!(cache.put(&url(i), blob(10)));
        }
        // Touch 0 so 1 becomes the oldest.
        assert!(cache.get(&url(0)).is_some());
        cache.put(&url(50), blob(10));

        assert_eq!(cache.len(), 50);
        assert!(cache.contains(&url(0)));
        assert!(!cache.contains(&url(1)));
        assert!(cache.contains(&url(50)));
    }

    #[test]
    fn test_misses_leave_recency_clock_alone() {
        let cache = ImageCache::new(3, 1_000);
        cache.put("a", blob(1));
        for _ in 0..5 {
            assert!(cache.get("missing").is_none());
        }
        assert_eq!(cache.lock().next_tick, 1);

        assert!(cache.get("a").is_some());
        assert_eq!(cache.lock().next_tick, 2);
    }

    #[test]
    fn test_survivors_are_most_recently_used() {
        let cache = ImageCache::new(3, 1_000);
        cache.put("a", blob(1));
        cache.put("b", blob(1));
        cache.put("c", blob(1));
        cache.get("a");
        cache.put("d", blob(1));
        cache.get("c");
        cache.put("e", blob(1));
        assert_eq!(cache.keys_by_recency(), vec!["d", "c", "e"]);
    }

    #[test]
    fn test_byte_bound_evicts_until_satisfied() {
        let cache = ImageCache::new(50, 100);
        cache.put("a", blob(40));
        cache.put("b", blob(40));
        cache.put("c", blob(70));
        assert_eq!(cache.keys_by_recency(), vec!["c"]);
        assert_eq!(cache.total_bytes(), 70);
    }

    #[test]
    fn test_refresh_replaces_size_accounting() {
        let cache = ImageCache::new(10, 100);
        cache.put("a", blob(60));
        cache.put("a", blob(20));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 20);
    }

    #[test]
    fn test_oversize_blob_is_refused() {
        let cache = ImageCache::new(10, 100);
        cache.put("a", blob(50));
        assert!(!cache.put("huge", blob(101)));
        assert!(cache.contains("a"));
        assert!(!cache.contains("huge"));
        assert_eq!(cache.total_bytes(), 50);
    }

    #[test]
    fn test_miss_returns_none() {
        let cache = ImageCache::new(DEFAULT_MAX_ENTRIES, DEFAULT_MAX_BYTES);
        assert!(cache.get("https://nowhere/x.jpg").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_keys_are_normalized() {
        let cache = ImageCache::new(DEFAULT_MAX_ENTRIES, DEFAULT_MAX_BYTES);
        cache.put("HTTPS://Image.TMDB.org/t/p/w500/a.jpg#frag", blob(5));
        assert!(cache.get(" https://image.tmdb.org/t/p/w500/a.jpg ").is_some());
    }

    #[test]
    fn test_bounds_hold_after_random_puts() {
        let cache = ImageCache::new(50, 27 * 1024 * 1024);
        let mut seed: u64 = 0x2545F4914F6CDD1D;
        for _ in 0..2_000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let key = format!("k{}", seed % 120);
            let size = (seed % (2 * 1024 * 1024)) as usize + 1;
            cache.put(&key, blob(size));
            if seed % 3 == 0 {
                cache.get(&format!("k{}", (seed >> 8) % 120));
            }
            assert!(cache.len() <= 50);
            assert!(cache.total_bytes() <= 27 * 1024 * 1024);
        }
    }

    #[test]
    fn test_concurrent_access_keeps_accounting_consistent() {
        let cache = Arc::new(ImageCache::new(20, 2_000));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        cache.put(&format!("t{t}-{}", i % 30), blob(50 + i % 40));
                        cache.get(&format!("t{}-{}", (t + 1) % 4, i % 30));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let keys = cache.keys_by_recency();
        let expected: usize = keys
            .iter()
            .map(|k| cache.get(k).map(|b| b.byte_size()).unwrap_or(0))
            .sum();
        assert_eq!(cache.total_bytes(), expected);
        assert!(cache.len() <= 20);
        assert!(cache.total_bytes() <= 2_000);
    }
}
