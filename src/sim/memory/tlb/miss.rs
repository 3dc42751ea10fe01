use super::EntryId;
use fnv::FnvHashMap;
use std::collections::VecDeque;

/// What happened to a request handed to [`MissCoordinator::miss`].
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Miss {
    /// A walk for the page is already in flight; the request waits on it.
    Coalesced,
    /// A new walk was started for the page. The caller must arrange for
    /// [`MissCoordinator::complete`] to be called once the walk latency has elapsed.
    Walk,
    /// All walkers are busy; the request waits for any walk to complete.
    Deferred,
}

/// Tracks in-flight page walks and the requests waiting on them.
///
/// There is at most one walk per page address. Requests that miss while all walkers are busy are
/// parked in FIFO order and re-admitted as walks complete; admission stops at the first request
/// that still cannot be admitted, so parked requests never overtake each other.
pub struct MissCoordinator {
    walks: FnvHashMap<u64, VecDeque<EntryId>>,
    deferred: VecDeque<(u64, EntryId)>,
    active: usize,
    max_walkers: usize,
}

impl MissCoordinator {
    pub fn new(max_walkers: usize) -> Self {
        Self {
            walks: FnvHashMap::default(),
            deferred: VecDeque::new(),
            active: 0,
            max_walkers,
        }
    }

    /// Number of walks currently in flight.
    pub fn active_walks(&self) -> usize {
        self.active
    }

    pub fn max_walkers(&self) -> usize {
        self.max_walkers
    }

    /// Number of requests parked because no walker was available.
    pub fn deferred(&self) -> usize {
        self.deferred.len()
    }

    /// Whether a walk for `page` is in flight.
    pub fn is_walking(&self, page: u64) -> bool {
        self.walks.contains_key(&page)
    }

    /// Number of requests waiting on the walk for `page`.
    pub fn waiting_on(&self, page: u64) -> usize {
        self.walks.get(&page).map_or(0, VecDeque::len)
    }

    /// Register a request that missed on `page`.
    pub fn miss(&mut self, page: u64, id: EntryId) -> Miss {
        match self.try_admit(page, id) {
            Some(result) => result,
            None => {
                self.deferred.push_back((page, id));
                Miss::Deferred
            }
        }
    }

    /// Coalesce onto an existing walk or start a new one. Returns `None` without recording the
    /// request if neither is possible.
    fn try_admit(&mut self, page: u64, id: EntryId) -> Option<Miss> {
        if let Some(queue) = self.walks.get_mut(&page) {
            queue.push_back(id);
            return Some(Miss::Coalesced);
        }
        if self.active < self.max_walkers {
            let mut queue = VecDeque::new();
            queue.push_back(id);
            self.walks.insert(page, queue);
            self.active += 1;
            return Some(Miss::Walk);
        }
        None
    }

    /// Finish the walk for `page`, returning the requests that waited on it in arrival order.
    ///
    /// # Panics
    ///
    /// Panics if no walk is in flight for `page`; a completion without a walk means a request
    /// was lost or duplicated somewhere.
    pub fn complete(&mut self, page: u64) -> VecDeque<EntryId> {
        let queue = match self.walks.remove(&page) {
            Some(v) => v,
            None => panic!("walk completion for page {:#x} without a walk in flight", page),
        };
        assert!(self.active > 0, "walker count underflow on page {:#x}", page);
        self.active -= 1;
        queue
    }

    /// Page address of the oldest parked request.
    pub fn peek_deferred(&self) -> Option<(u64, EntryId)> {
        self.deferred.front().copied()
    }

    /// Remove the oldest parked request without admitting it. Used when its page has become
    /// resident in the meantime.
    pub fn pop_deferred(&mut self) -> Option<(u64, EntryId)> {
        self.deferred.pop_front()
    }

    /// Try to admit the oldest parked request. Returns `None`, leaving it parked, if no walker
    /// is free for it.
    pub fn admit_deferred(&mut self) -> Option<(u64, EntryId, Miss)> {
        let (page, id) = self.peek_deferred()?;
        let result = self.try_admit(page, id)?;
        self.deferred.pop_front();
        Some((page, id, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesce_same_page() {
        let mut miss = MissCoordinator::new(1);
        assert_eq!(miss.miss(0x1000, EntryId(0)), Miss::Walk);
        assert_eq!(miss.miss(0x1000, EntryId(1)), Miss::Coalesced);
        assert_eq!(miss.miss(0x1000, EntryId(2)), Miss::Coalesced);
        assert_eq!(miss.active_walks(), 1);
        assert_eq!(miss.waiting_on(0x1000), 3);

        let done: Vec<_> = miss.complete(0x1000).into_iter().collect();
        assert_eq!(done, vec![EntryId(0), EntryId(1), EntryId(2)]);
        assert_eq!(miss.active_walks(), 0);
        assert!(!miss.is_walking(0x1000));
    }

    #[test]
    fn test_walker_bound() {
        let mut miss = MissCoordinator::new(2);
        assert_eq!(miss.miss(0x1000, EntryId(0)), Miss::Walk);
        assert_eq!(miss.miss(0x2000, EntryId(1)), Miss::Walk);
        assert_eq!(miss.miss(0x3000, EntryId(2)), Miss::Deferred);
        assert_eq!(miss.miss(0x4000, EntryId(3)), Miss::Deferred);
        // Coalescing needs no walker.
        assert_eq!(miss.miss(0x2000, EntryId(4)), Miss::Coalesced);
        assert_eq!(miss.active_walks(), 2);
        assert_eq!(miss.deferred(), 2);

        // Nothing can be admitted until a walker frees up.
        assert_eq!(miss.admit_deferred(), None);
        miss.complete(0x1000);
        assert_eq!(miss.admit_deferred(), Some((0x3000, EntryId(2), Miss::Walk)));
        assert_eq!(miss.admit_deferred(), None);
        assert_eq!(miss.peek_deferred(), Some((0x4000, EntryId(3))));
        assert!(miss.active_walks() <= miss.max_walkers());
    }

    #[test]
    fn test_deferred_coalesces_onto_running_walk() {
        let mut miss = MissCoordinator::new(1);
        assert_eq!(miss.miss(0x1000, EntryId(0)), Miss::Walk);
        assert_eq!(miss.miss(0x2000, EntryId(1)), Miss::Deferred);
        assert_eq!(miss.miss(0x2000, EntryId(2)), Miss::Deferred);
        miss.complete(0x1000);
        assert_eq!(miss.admit_deferred(), Some((0x2000, EntryId(1), Miss::Walk)));
        assert_eq!(miss.admit_deferred(), Some((0x2000, EntryId(2), Miss::Coalesced)));
        assert_eq!(miss.deferred(), 0);
    }

    #[test]
    #[should_panic(expected = "without a walk in flight")]
    fn test_unmatched_completion() {
        let mut miss = MissCoordinator::new(1);
        miss.complete(0x1000);
    }
}
