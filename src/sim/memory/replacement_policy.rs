pub use lru::Lru;

pub trait ReplacementPolicy {
    fn new(assoc: usize) -> Self
    where
        Self: Sized;

    /// Insert an new entry.
    fn insert(&mut self, index: usize);

    /// Mark an entry as recently accessed.
    fn touch(&mut self, index: usize);

    /// Select an entry for eviction. Invalid entries are always preferred.
    fn select(&mut self) -> usize;
}

mod lru {

    use super::ReplacementPolicy;

    /// True least-recently-used replacement.
    ///
    /// Every insert or touch stamps the entry with a monotonically increasing counter, and the
    /// entry with the smallest stamp is selected. Associativity of a TLB is small enough that a
    /// linear scan is fine.
    pub struct Lru {
        valid: Box<[bool]>,
        stamp: Box<[u64]>,
        clock: u64,
    }

    impl ReplacementPolicy for Lru {
        fn new(assoc: usize) -> Self {
            Self {
                valid: vec![false; assoc].into_boxed_slice(),
                stamp: vec![0; assoc].into_boxed_slice(),
                clock: 0,
            }
        }

        fn insert(&mut self, index: usize) {
            self.valid[index] = true;
            self.touch(index);
        }

        fn touch(&mut self, index: usize) {
            self.clock += 1;
            self.stamp[index] = self.clock;
        }

        fn select(&mut self) -> usize {
            assert!(!self.valid.is_empty(), "cannot select a victim from an empty set");
            let mut victim = 0;
            for i in 0..self.valid.len() {
                if !self.valid[i] {
                    return i;
                }
                if self.stamp[i] < self.stamp[victim] {
                    victim = i;
                }
            }
            victim
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_prefers_invalid() {
            let mut lru = Lru::new(4);
            lru.insert(0);
            lru.insert(2);
            assert_eq!(lru.select(), 1);
            lru.insert(1);
            assert_eq!(lru.select(), 3);
        }

        #[test]
        fn test_least_recent() {
            let mut lru = Lru::new(3);
            lru.insert(0);
            lru.insert(1);
            lru.insert(2);
            assert_eq!(lru.select(), 0);
            lru.touch(0);
            assert_eq!(lru.select(), 1);
            lru.touch(1);
            assert_eq!(lru.select(), 2);
        }
    }
}
