use super::event::Scheduler;
use super::unit::{AccessKind, Callback, MemReq, Unit, UnitHandle, UnitId};
use crate::config::GeneratorConfig;
use log::{debug, trace};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// A requester issuing a seeded random stream of loads and stores.
///
/// One request is issued every `interval` ns. Once the target reports blocked, issuing pauses
/// until the target resumes us.
pub struct Generator {
    id: UnitId,
    this: Weak<RefCell<Generator>>,
    handle: UnitHandle,
    scheduler: Rc<dyn Scheduler>,
    target: UnitHandle,
    config: GeneratorConfig,
    rng: ChaCha8Rng,
    issued: u64,
    completed: Rc<Cell<u64>>,
    blocked: bool,
    ticking: bool,
}

impl Generator {
    pub fn new(
        id: UnitId,
        config: &GeneratorConfig,
        scheduler: Rc<dyn Scheduler>,
        target: UnitHandle,
    ) -> Rc<RefCell<Generator>> {
        debug!("gen{}: will issue {} requests", id, config.count);
        Rc::new_cyclic(|this: &Weak<RefCell<Generator>>| {
            let unit: Weak<RefCell<dyn Unit>> = this.clone();
            RefCell::new(Generator {
                id,
                this: this.clone(),
                handle: UnitHandle::from_weak(id, unit),
                scheduler,
                target,
                config: config.clone(),
                rng: SeedableRng::seed_from_u64(config.seed),
                issued: 0,
                completed: Rc::new(Cell::new(0)),
                blocked: false,
                ticking: false,
            })
        })
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub fn completed(&self) -> u64 {
        self.completed.get()
    }

    /// Whether every request has been issued and completed.
    pub fn is_done(&self) -> bool {
        self.completed.get() == self.config.count
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Start issuing requests.
    pub fn start(&mut self) {
        self.schedule_tick(0);
    }

    fn schedule_tick(&mut self, delay: u64) {
        if self.ticking || self.blocked || self.issued >= self.config.count {
            return;
        }
        self.ticking = true;
        let this = self.this.clone();
        self.scheduler.schedule_after(
            delay,
            Box::new(move || {
                if let Some(generator) = this.upgrade() {
                    generator.borrow_mut().tick();
                }
            }),
        );
    }

    fn next_request(&mut self) -> (AccessKind, MemReq) {
        let length = self.config.length;
        let addr = self.rng.gen_range(0..self.config.max_address) / length * length;
        let kind = if self.rng.gen_range(0..100) < self.config.write_percentage {
            AccessKind::Store
        } else {
            AccessKind::Load
        };
        (kind, MemReq { pid: self.config.pid, addr, length })
    }

    fn tick(&mut self) {
        self.ticking = false;
        let (kind, req) = self.next_request();
        trace!("gen{}: {:?} addr={:#x}", self.id, kind, req.addr);

        let completed = self.completed.clone();
        let callback: Callback = Box::new(move || completed.set(completed.get() + 1));
        self.issued += 1;
        if self.target.access(kind, &self.handle, req, callback) {
            debug!("gen{}: blocked after {} requests", self.id, self.issued);
            self.blocked = true;
        }
        self.schedule_tick(self.config.interval);
    }
}

impl Unit for Generator {
    fn resume(&mut self, from: UnitId) {
        assert_eq!(from, self.target.id(), "gen{}: resume from unit {}", self.id, from);
        debug!("gen{}: resumed", self.id);
        self.blocked = false;
        self.schedule_tick(self.config.interval);
    }
}
