use crate::config::TlbConfig;
use crate::sim::event::Scheduler;
use crate::sim::unit::{AccessKind, Callback, MemReq, Unit, UnitHandle, UnitId};
use log::{debug, trace};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

mod gate;
mod miss;
mod translation_cache;
pub use gate::{FlowGate, Lane};
pub use miss::{Miss, MissCoordinator};
pub use translation_cache::TranslationCache;

/// Basic performance statistics gathered from the TLB.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct Statistics {
    pub hit: u64,
    pub miss: u64,
    /// Misses that joined a walk already in flight.
    pub coalesce: u64,
    pub walk: u64,
    pub evict: u64,
    /// Misses that had to wait for a free walker.
    pub defer: u64,
    /// Times the requester was told to stop.
    pub block: u64,
    /// Times the downstream unit told us to stop.
    pub stall: u64,
}

impl Statistics {
    pub fn print(&self, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        writeln!(writer, "TLB Hit      {}", self.hit)?;
        writeln!(writer, "TLB Miss     {}", self.miss)?;
        writeln!(writer, "TLB Coalesce {}", self.coalesce)?;
        writeln!(writer, "TLB Walk     {}", self.walk)?;
        writeln!(writer, "TLB Evict    {}", self.evict)?;
        writeln!(writer, "TLB Defer    {}", self.defer)?;
        writeln!(writer, "TLB Block    {}", self.block)?;
        writeln!(writer, "TLB Stall    {}", self.stall)?;
        Ok(())
    }
}

/// Index of a request held inside the TLB.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub struct EntryId(usize);

struct Entry {
    kind: AccessKind,
    req: MemReq,
    callback: Callback,
}

/// Owner of every request the TLB holds. Walk records and ready queues refer to requests by
/// [`EntryId`] only.
#[derive(Default)]
struct Entries {
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
}

impl Entries {
    fn insert(&mut self, entry: Entry) -> EntryId {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(entry);
                EntryId(idx)
            }
            None => {
                self.slots.push(Some(entry));
                EntryId(self.slots.len() - 1)
            }
        }
    }

    fn get(&self, id: EntryId) -> &Entry {
        match self.slots.get(id.0) {
            Some(Some(entry)) => entry,
            _ => panic!("no request held for {:?}", id),
        }
    }

    fn remove(&mut self, id: EntryId) -> Entry {
        match self.slots.get_mut(id.0).and_then(Option::take) {
            Some(entry) => {
                self.free.push(id.0);
                entry
            }
            None => panic!("no request held for {:?}", id),
        }
    }

    fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

/// Timing model of a single-level TLB in front of a load/store unit.
///
/// Hits are forwarded to the downstream unit at once. Misses wait for a page walk of fixed
/// latency; walks to the same page are shared, and at most `walkers` walks are in flight. The
/// TLB exerts backpressure on its requester when it holds too many requests of one kind, and
/// buffers translated requests while the downstream unit is blocked.
///
/// All requests must come from a single process, as the cache is not tagged with an address
/// space.
pub struct Tlb {
    id: UnitId,
    this: Weak<RefCell<Tlb>>,
    handle: UnitHandle,
    scheduler: Rc<dyn Scheduler>,
    cache: TranslationCache,
    walks: MissCoordinator,
    gate: FlowGate,
    entries: Entries,
    page_mask: u64,
    miss_latency: u64,
    cur_pid: Option<u32>,
    stats: Statistics,
}

impl Tlb {
    /// Create a new TLB forwarding loads to `load` and stores to `store`, which may be the same
    /// unit.
    pub fn new(
        id: UnitId,
        config: &TlbConfig,
        scheduler: Rc<dyn Scheduler>,
        load: UnitHandle,
        store: UnitHandle,
    ) -> Rc<RefCell<Tlb>> {
        assert!(config.page_size.is_power_of_two(), "page size must be a power of two");
        assert!(config.size == 0 || config.walkers > 0, "an enabled TLB needs a walker");
        debug!(
            "tlb{}: size={}, page_mask={:#x}, walkers={}",
            id,
            config.size,
            !(config.page_size - 1),
            config.walkers
        );

        Rc::new_cyclic(|this: &Weak<RefCell<Tlb>>| {
            let unit: Weak<RefCell<dyn Unit>> = this.clone();
            RefCell::new(Tlb {
                id,
                this: this.clone(),
                handle: UnitHandle::from_weak(id, unit),
                scheduler,
                cache: TranslationCache::new(config.size),
                walks: MissCoordinator::new(config.walkers),
                gate: FlowGate::new(load, store, config.max_loads, config.max_stores),
                entries: Entries::default(),
                page_mask: !(config.page_size - 1),
                miss_latency: config.miss_latency,
                cur_pid: None,
                stats: Statistics::default(),
            })
        })
    }

    /// Handle to give requesters so they can send requests and receive resumes.
    pub fn handle(&self) -> &UnitHandle {
        &self.handle
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn walks(&self) -> &MissCoordinator {
        &self.walks
    }

    pub fn lane(&self, kind: AccessKind) -> &Lane {
        self.gate.lane(kind)
    }

    /// Number of requests currently held inside the TLB.
    pub fn held(&self) -> usize {
        self.entries.len()
    }

    pub fn page_addr(&self, addr: u64) -> u64 {
        addr & self.page_mask
    }

    pub fn submit_load(&mut self, src: &UnitHandle, req: MemReq, callback: Callback) -> bool {
        self.submit(AccessKind::Load, src, req, callback)
    }

    pub fn submit_store(&mut self, src: &UnitHandle, req: MemReq, callback: Callback) -> bool {
        self.submit(AccessKind::Store, src, req, callback)
    }

    /// Accept a request from `src`. Returns whether `src` must stop sending requests of this
    /// kind until resumed.
    pub fn submit(
        &mut self,
        kind: AccessKind,
        src: &UnitHandle,
        req: MemReq,
        callback: Callback,
    ) -> bool {
        self.check_pid(req.pid);
        let page = self.page_addr(req.addr);
        trace!("tlb{}: {:?} addr={:#x}, page={:#x}", self.id, kind, req.addr, page);

        if self.lookup(page) {
            if self.gate.lane(kind).is_blocked() {
                let id = self.entries.insert(Entry { kind, req, callback });
                let lane = self.gate.lane_mut(kind);
                lane.hold();
                lane.push_ready(id);
            } else {
                self.forward(kind, req, callback);
            }
        } else {
            let id = self.entries.insert(Entry { kind, req, callback });
            self.gate.lane_mut(kind).hold();
            self.miss(page, id);
        }

        let blocked = self.gate.lane_mut(kind).block_src(src);
        if blocked {
            self.stats.block += 1;
            debug!("tlb{}: blocking unit {} on {:?}", self.id, src.id(), kind);
        }
        blocked
    }

    fn check_pid(&mut self, pid: u32) {
        match self.cur_pid {
            None => self.cur_pid = Some(pid),
            Some(cur) => assert!(
                cur == pid,
                "tlb{}: request from pid {} while serving pid {}",
                self.id,
                pid,
                cur
            ),
        }
    }

    fn lookup(&mut self, page: u64) -> bool {
        let hit = self.cache.lookup(page);
        trace!("tlb{}: page={:#x} {}", self.id, page, if hit { "hit" } else { "miss" });
        if hit {
            self.stats.hit += 1;
        } else {
            self.stats.miss += 1;
        }
        hit
    }

    fn miss(&mut self, page: u64, id: EntryId) {
        match self.walks.miss(page, id) {
            Miss::Walk => self.walk(page),
            Miss::Coalesced => {
                trace!("tlb{}: add pending, page={:#x}", self.id, page);
                self.stats.coalesce += 1;
            }
            Miss::Deferred => {
                trace!("tlb{}: no walker for page={:#x}", self.id, page);
                self.stats.defer += 1;
            }
        }
    }

    fn walk(&mut self, page: u64) {
        trace!("tlb{}: walk, page={:#x}", self.id, page);
        self.stats.walk += 1;
        let this = self.this.clone();
        self.scheduler.schedule_after(
            self.miss_latency,
            Box::new(move || {
                if let Some(tlb) = this.upgrade() {
                    tlb.borrow_mut().walk_complete(page);
                }
            }),
        );
    }

    /// A page walk has finished. Install the translation, replay every request that waited on
    /// it in arrival order, and hand freed walkers to deferred misses.
    pub fn walk_complete(&mut self, page: u64) {
        let waiting = self.walks.complete(page);
        let evicted = self.cache.evict_and_insert(page);
        trace!("tlb{}: walk done, page={:#x}, evict={:x?}", self.id, page, evicted);
        if evicted.is_some() {
            self.stats.evict += 1;
        }

        for id in waiting {
            self.replay(id);
        }
        self.admit_deferred();
    }

    fn admit_deferred(&mut self) {
        while let Some((page, id)) = self.walks.peek_deferred() {
            // Its page may have been walked for someone else while it was parked.
            if self.cache.contains(page) {
                self.walks.pop_deferred();
                self.replay(id);
                continue;
            }
            match self.walks.admit_deferred() {
                None => break,
                Some((page, _, Miss::Walk)) => self.walk(page),
                Some((_, _, Miss::Coalesced)) => self.stats.coalesce += 1,
                Some((_, _, Miss::Deferred)) => unreachable!(),
            }
        }
    }

    /// Send a held, translated request on its way, or queue it if its lane is blocked.
    fn replay(&mut self, id: EntryId) {
        let kind = self.entries.get(id).kind;
        let lane = self.gate.lane_mut(kind);
        if lane.is_blocked() {
            trace!("tlb{}: {:?} blocked, queue ready", self.id, kind);
            lane.push_ready(id);
        } else {
            self.pass_up(id);
        }
    }

    fn pass_up(&mut self, id: EntryId) {
        let Entry { kind, req, callback } = self.entries.remove(id);
        self.forward(kind, req, callback);
        if let Some(src) = self.gate.lane_mut(kind).release() {
            debug!("tlb{}: resume unit {} on {:?}", self.id, src.id(), kind);
            self.scheduler.schedule_resume(0, &src, self.id);
        }
    }

    fn forward(&mut self, kind: AccessKind, req: MemReq, callback: Callback) {
        trace!("tlb{}: forward {:?} addr={:#x}", self.id, kind, req.addr);
        let downstream = self.gate.lane(kind).downstream().clone();
        let blocked = downstream.access(kind, &self.handle, req, callback);
        if blocked {
            debug!("tlb{}: {:?} unit {} blocked", self.id, kind, downstream.id());
            self.stats.stall += 1;
        }
        self.gate.lane_mut(kind).set_blocked(blocked);
    }

    /// The downstream unit `from` can accept requests again. Drains the ready queue of every
    /// blocked lane it serves until it blocks again.
    ///
    /// # Panics
    ///
    /// Panics if `from` serves no lane, or if none of the lanes it serves is blocked.
    pub fn resume(&mut self, from: UnitId) {
        let mut known = false;
        let mut unblocked = false;
        for &kind in &[AccessKind::Store, AccessKind::Load] {
            let lane = self.gate.lane_mut(kind);
            if lane.downstream().id() != from {
                continue;
            }
            known = true;
            // A unit serving both lanes may have blocked only one of them.
            if !lane.is_blocked() {
                continue;
            }
            unblocked = true;
            debug!("tlb{}: {:?} unblocked", self.id, kind);
            lane.set_blocked(false);
            while let Some(id) = self.gate.lane_mut(kind).pop_ready() {
                self.pass_up(id);
            }
        }
        assert!(known, "tlb{}: resume from unit {} which is not downstream", self.id, from);
        assert!(
            unblocked,
            "tlb{}: resume from unit {} while no lane it serves is blocked",
            self.id,
            from
        );
    }
}

impl Unit for Tlb {
    fn load(&mut self, src: &UnitHandle, req: MemReq, callback: Callback) -> bool {
        self.submit_load(src, req, callback)
    }

    fn store(&mut self, src: &UnitHandle, req: MemReq, callback: Callback) -> bool {
        self.submit_store(src, req, callback)
    }

    fn resume(&mut self, from: UnitId) {
        Tlb::resume(self, from)
    }
}
