use super::super::cache_set::CacheSet;

/// A fully associative, LRU-replaced set of translated page addresses.
///
/// A capacity of zero disables translation modelling altogether: every lookup hits and nothing
/// is ever inserted.
pub struct TranslationCache {
    set: CacheSet<u64>,
}

impl TranslationCache {
    pub fn new(capacity: usize) -> Self {
        Self { set: CacheSet::new(capacity) }
    }

    pub fn is_enabled(&self) -> bool {
        !self.set.is_empty()
    }

    /// Look up a page address, refreshing its recency on hit.
    pub fn lookup(&mut self, page: u64) -> bool {
        if !self.is_enabled() {
            return true;
        }
        match self.set.find(|&entry| entry == page) {
            Ok(ptr) => {
                self.set.touch(ptr);
                true
            }
            Err(_) => false,
        }
    }

    /// Whether a page address is resident, without changing its recency.
    pub fn contains(&self, page: u64) -> bool {
        !self.is_enabled() || self.set.iter().any(|&entry| entry == page)
    }

    /// Insert a page address, returning the page that had to make room for it.
    ///
    /// Slots that have never been filled are used before anything is evicted. Inserting a page
    /// that is already present only refreshes it.
    pub fn evict_and_insert(&mut self, page: u64) -> Option<u64> {
        if !self.is_enabled() {
            return None;
        }
        match self.set.find(|&entry| entry == page) {
            Ok(ptr) => {
                self.set.touch(ptr);
                None
            }
            Err(ptr) => self.set.insert(ptr, page),
        }
    }

    /// Page addresses currently resident, in no particular order.
    pub fn resident(&self) -> impl Iterator<Item = u64> + '_ {
        self.set.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::collections::VecDeque;

    #[test]
    fn test_disabled_always_hits() {
        let mut cache = TranslationCache::new(0);
        assert!(!cache.is_enabled());
        assert!(cache.lookup(0x1000));
        assert!(cache.contains(0x1000));
        assert_eq!(cache.evict_and_insert(0x1000), None);
        assert_eq!(cache.resident().count(), 0);
    }

    #[test]
    fn test_cold_cache_misses() {
        let mut cache = TranslationCache::new(4);
        // Nothing that was never inserted may hit, including page zero.
        assert!(!cache.lookup(0));
        assert!(!cache.lookup(0x1000));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = TranslationCache::new(2);
        assert_eq!(cache.evict_and_insert(0xa000), None);
        assert_eq!(cache.evict_and_insert(0xb000), None);
        assert!(cache.lookup(0xa000));
        assert_eq!(cache.evict_and_insert(0xc000), Some(0xb000));
        assert!(cache.lookup(0xa000));
        assert!(!cache.lookup(0xb000));
        assert!(cache.lookup(0xc000));
    }

    #[test]
    fn test_contains_keeps_recency() {
        let mut cache = TranslationCache::new(2);
        cache.evict_and_insert(0xa000);
        cache.evict_and_insert(0xb000);
        assert!(cache.contains(0xa000));
        assert!(!cache.contains(0xc000));
        // 0xa000 is still the least recently used.
        assert_eq!(cache.evict_and_insert(0xc000), Some(0xa000));
    }

    #[test]
    fn test_reinsert_does_not_duplicate() {
        let mut cache = TranslationCache::new(2);
        cache.evict_and_insert(0xa000);
        cache.evict_and_insert(0xa000);
        assert_eq!(cache.resident().count(), 1);
    }

    /// An access hits iff fewer than `capacity` distinct other pages were touched since the
    /// page was last touched.
    #[test]
    fn test_lru_law() {
        const CAPACITY: usize = 8;
        let mut cache = TranslationCache::new(CAPACITY);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        // Most recently used at the front.
        let mut reference: VecDeque<u64> = VecDeque::new();

        for _ in 0..10000 {
            let page = rng.gen_range(0..24u64) << 12;
            let expected = reference.iter().position(|&p| p == page);
            let hit = cache.lookup(page);
            assert_eq!(hit, expected.is_some(), "page {:#x}", page);
            match expected {
                Some(pos) => {
                    reference.remove(pos);
                }
                None => {
                    let evicted = cache.evict_and_insert(page);
                    let expected_evicted =
                        if reference.len() == CAPACITY { reference.pop_back() } else { None };
                    assert_eq!(evicted, expected_evicted);
                }
            }
            reference.push_front(page);
        }
    }
}
