use super::EntryId;
use crate::sim::unit::{AccessKind, UnitHandle};
use std::collections::VecDeque;

/// Admission and backpressure state of one request direction.
///
/// Two independent conditions are tracked. `blocked` is set when the downstream unit refused
/// further requests; translated requests then wait in the ready queue. `pending` counts requests
/// held inside the TLB (waiting on a walk or in the ready queue); while it is at or above
/// `max_pending` the requester is told to stop, and it is resumed once the count drops below.
pub struct Lane {
    kind: AccessKind,
    downstream: UnitHandle,
    blocked: bool,
    ready: VecDeque<EntryId>,
    pending: usize,
    max_pending: usize,
    blocked_src: Option<UnitHandle>,
}

impl Lane {
    fn new(kind: AccessKind, downstream: UnitHandle, max_pending: usize) -> Self {
        assert!(max_pending > 0, "{:?} lane needs a pending limit of at least one", kind);
        Lane {
            kind,
            downstream,
            blocked: false,
            ready: VecDeque::new(),
            pending: 0,
            max_pending,
            blocked_src: None,
        }
    }

    pub fn downstream(&self) -> &UnitHandle {
        &self.downstream
    }

    /// Whether the downstream unit has asked us to stop.
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn set_blocked(&mut self, blocked: bool) {
        self.blocked = blocked;
    }

    /// Requests held inside the TLB for this direction.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn ready(&self) -> usize {
        self.ready.len()
    }

    /// Whether a requester is waiting for a resume from this lane.
    pub fn is_blocking_src(&self) -> bool {
        self.blocked_src.is_some()
    }

    /// Account for a request that is now held inside the TLB.
    ///
    /// # Panics
    ///
    /// Panics if the lane is already at its limit, as the requester was told to stop.
    pub fn hold(&mut self) {
        assert!(
            self.pending < self.max_pending,
            "{:?} lane holds {} requests, over its limit of {}",
            self.kind,
            self.pending + 1,
            self.max_pending
        );
        self.pending += 1;
    }

    /// Account for a held request leaving the TLB.
    ///
    /// Returns the requester to resume if this made the pending count cross below the limit.
    pub fn release(&mut self) -> Option<UnitHandle> {
        assert!(self.pending > 0, "{:?} lane pending count underflow", self.kind);
        let was_full = self.pending >= self.max_pending;
        self.pending -= 1;
        if was_full && self.pending < self.max_pending {
            match self.blocked_src.take() {
                Some(src) => Some(src),
                None => panic!("{:?} lane was full without a blocked requester", self.kind),
            }
        } else {
            None
        }
    }

    /// Decide whether `src` must stop sending, remembering it for the later resume.
    ///
    /// # Panics
    ///
    /// Panics if a requester is already waiting on this lane.
    pub fn block_src(&mut self, src: &UnitHandle) -> bool {
        if let Some(prev) = &self.blocked_src {
            panic!(
                "{:?} lane blocks unit {} while unit {} is still blocked",
                self.kind,
                src.id(),
                prev.id()
            );
        }
        if self.pending < self.max_pending {
            return false;
        }
        self.blocked_src = Some(src.clone());
        true
    }

    /// Queue a translated request until the downstream unit resumes us.
    pub fn push_ready(&mut self, id: EntryId) {
        debug_assert!(self.blocked);
        self.ready.push_back(id);
    }

    /// Take the next ready request, if the downstream unit can accept it.
    pub fn pop_ready(&mut self) -> Option<EntryId> {
        if self.blocked {
            return None;
        }
        self.ready.pop_front()
    }
}

/// The pair of load and store lanes.
pub struct FlowGate {
    load: Lane,
    store: Lane,
}

impl FlowGate {
    pub fn new(
        load: UnitHandle,
        store: UnitHandle,
        max_pending_loads: usize,
        max_pending_stores: usize,
    ) -> Self {
        FlowGate {
            load: Lane::new(AccessKind::Load, load, max_pending_loads),
            store: Lane::new(AccessKind::Store, store, max_pending_stores),
        }
    }

    pub fn lane(&self, kind: AccessKind) -> &Lane {
        match kind {
            AccessKind::Load => &self.load,
            AccessKind::Store => &self.store,
        }
    }

    pub fn lane_mut(&mut self, kind: AccessKind) -> &mut Lane {
        match kind {
            AccessKind::Load => &mut self.load,
            AccessKind::Store => &mut self.store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::unit::{Unit, UnitId};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Dummy;

    impl Unit for Dummy {}

    fn handle(id: u32, unit: &Rc<RefCell<Dummy>>) -> UnitHandle {
        UnitHandle::new(UnitId(id), unit)
    }

    #[test]
    fn test_block_and_release_edge() {
        let dummy = Rc::new(RefCell::new(Dummy));
        let mut lane = Lane::new(AccessKind::Load, handle(1, &dummy), 2);
        let src = handle(2, &dummy);

        lane.hold();
        assert!(!lane.block_src(&src));
        lane.hold();
        assert!(lane.block_src(&src));
        assert!(lane.is_blocking_src());

        assert_eq!(lane.release().map(|h| h.id()), Some(UnitId(2)));
        assert!(!lane.is_blocking_src());
        assert!(lane.release().is_none());
        assert!(!lane.block_src(&src));
    }

    #[test]
    #[should_panic(expected = "is still blocked")]
    fn test_same_requester_blocked_twice() {
        let dummy = Rc::new(RefCell::new(Dummy));
        let mut lane = Lane::new(AccessKind::Load, handle(1, &dummy), 2);
        let src = handle(2, &dummy);
        lane.hold();
        lane.hold();
        assert!(lane.block_src(&src));
        lane.block_src(&src);
    }

    #[test]
    #[should_panic(expected = "over its limit")]
    fn test_hold_past_limit() {
        let dummy = Rc::new(RefCell::new(Dummy));
        let mut lane = Lane::new(AccessKind::Store, handle(1, &dummy), 1);
        lane.hold();
        lane.hold();
    }

    #[test]
    #[should_panic(expected = "is still blocked")]
    fn test_second_blocked_requester() {
        let dummy = Rc::new(RefCell::new(Dummy));
        let mut lane = Lane::new(AccessKind::Store, handle(1, &dummy), 1);
        lane.hold();
        assert!(lane.block_src(&handle(2, &dummy)));
        lane.block_src(&handle(3, &dummy));
    }

    #[test]
    fn test_ready_queue_waits_for_downstream() {
        let dummy = Rc::new(RefCell::new(Dummy));
        let mut lane = Lane::new(AccessKind::Load, handle(1, &dummy), 4);
        lane.set_blocked(true);
        lane.push_ready(EntryId(7));
        lane.push_ready(EntryId(8));
        assert_eq!(lane.pop_ready(), None);
        lane.set_blocked(false);
        assert_eq!(lane.pop_ready(), Some(EntryId(7)));
        assert_eq!(lane.pop_ready(), Some(EntryId(8)));
        assert_eq!(lane.pop_ready(), None);
    }
}
