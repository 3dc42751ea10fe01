use crate::config::LoadStoreConfig;
use crate::sim::event::Scheduler;
use crate::sim::unit::{AccessKind, Callback, MemReq, Unit, UnitHandle, UnitId};
use log::{debug, trace};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Statistics of a [`LoadStoreUnit`].
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct Statistics {
    pub load: u64,
    pub store: u64,
}

struct Port {
    inflight: usize,
    max_inflight: usize,
    blocked_src: Option<UnitHandle>,
}

impl Port {
    fn new(max_inflight: usize) -> Self {
        assert!(max_inflight > 0);
        Port { inflight: 0, max_inflight, blocked_src: None }
    }
}

/// Simulate an execution unit that completes every request after a fixed latency, with a bound
/// on the number of requests of each kind in flight.
pub struct LoadStoreUnit {
    id: UnitId,
    this: Weak<RefCell<LoadStoreUnit>>,
    scheduler: Rc<dyn Scheduler>,
    latency: u64,
    load: Port,
    store: Port,
    stats: Statistics,
}

impl LoadStoreUnit {
    pub fn new(
        id: UnitId,
        config: &LoadStoreConfig,
        scheduler: Rc<dyn Scheduler>,
    ) -> Rc<RefCell<LoadStoreUnit>> {
        Rc::new_cyclic(|this| {
            RefCell::new(LoadStoreUnit {
                id,
                this: this.clone(),
                scheduler,
                latency: config.latency,
                load: Port::new(config.max_loads),
                store: Port::new(config.max_stores),
                stats: Statistics::default(),
            })
        })
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// Requests of `kind` currently in flight.
    pub fn inflight(&self, kind: AccessKind) -> usize {
        self.port(kind).inflight
    }

    fn port(&self, kind: AccessKind) -> &Port {
        match kind {
            AccessKind::Load => &self.load,
            AccessKind::Store => &self.store,
        }
    }

    fn port_mut(&mut self, kind: AccessKind) -> &mut Port {
        match kind {
            AccessKind::Load => &mut self.load,
            AccessKind::Store => &mut self.store,
        }
    }

    fn accept(&mut self, kind: AccessKind, src: &UnitHandle, req: MemReq, callback: Callback) -> bool {
        let id = self.id;
        let port = self.port_mut(kind);
        assert!(
            port.inflight < port.max_inflight,
            "lsu{}: {:?} from unit {} while saturated",
            id,
            kind,
            src.id()
        );
        port.inflight += 1;
        let blocked = port.inflight >= port.max_inflight;
        if blocked {
            port.blocked_src = Some(src.clone());
        }
        trace!("lsu{}: {:?} addr={:#x}, blocked={}", id, kind, req.addr, blocked);

        let this = self.this.clone();
        self.scheduler.schedule_after(
            self.latency,
            Box::new(move || {
                if let Some(unit) = this.upgrade() {
                    unit.borrow_mut().complete(kind);
                }
                callback();
            }),
        );
        blocked
    }

    fn complete(&mut self, kind: AccessKind) {
        let id = self.id;
        match kind {
            AccessKind::Load => self.stats.load += 1,
            AccessKind::Store => self.stats.store += 1,
        }
        let port = self.port_mut(kind);
        assert!(port.inflight > 0, "lsu{}: {:?} completion with nothing in flight", id, kind);
        let was_full = port.inflight >= port.max_inflight;
        port.inflight -= 1;
        if was_full && port.inflight < port.max_inflight {
            if let Some(src) = port.blocked_src.take() {
                debug!("lsu{}: resume unit {} on {:?}", id, src.id(), kind);
                self.scheduler.schedule_resume(0, &src, id);
            }
        }
    }
}

impl Unit for LoadStoreUnit {
    fn load(&mut self, src: &UnitHandle, req: MemReq, callback: Callback) -> bool {
        self.accept(AccessKind::Load, src, req, callback)
    }

    fn store(&mut self, src: &UnitHandle, req: MemReq, callback: Callback) -> bool {
        self.accept(AccessKind::Store, src, req, callback)
    }
}
