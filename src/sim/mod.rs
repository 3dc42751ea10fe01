pub mod event;
pub mod generator;
pub mod memory;
pub mod unit;

pub use event::{EventLoop, Scheduler};
pub use generator::Generator;
pub use memory::{LoadStoreUnit, Tlb};
pub use unit::{AccessKind, Callback, MemReq, Unit, UnitHandle, UnitId};

use crate::config::Config;
use log::info;
use std::cell::RefCell;
use std::rc::Rc;

const LOAD_UNIT_ID: UnitId = UnitId(0);
const STORE_UNIT_ID: UnitId = UnitId(1);
const TLB_ID: UnitId = UnitId(2);
const GENERATOR_ID: UnitId = UnitId(3);

/// A generator feeding a TLB in front of a load unit and a store unit, all driven by one event
/// loop.
///
/// Loads and stores go to separate units: a resume names the unit, not the direction, so a unit
/// shared by both TLB lanes would unblock a direction that is still saturated.
///
/// The system owns every unit; units only reference each other through weak handles.
pub struct System {
    event_loop: Rc<EventLoop>,
    load_unit: Rc<RefCell<LoadStoreUnit>>,
    store_unit: Rc<RefCell<LoadStoreUnit>>,
    tlb: Rc<RefCell<Tlb>>,
    generator: Rc<RefCell<Generator>>,
}

impl System {
    pub fn new(config: &Config) -> System {
        let event_loop = Rc::new(EventLoop::new());
        let load_unit = LoadStoreUnit::new(LOAD_UNIT_ID, &config.memory, event_loop.clone());
        let store_unit = LoadStoreUnit::new(STORE_UNIT_ID, &config.memory, event_loop.clone());
        let tlb = Tlb::new(
            TLB_ID,
            &config.tlb,
            event_loop.clone(),
            UnitHandle::new(LOAD_UNIT_ID, &load_unit),
            UnitHandle::new(STORE_UNIT_ID, &store_unit),
        );
        let tlb_handle = tlb.borrow().handle().clone();
        let generator =
            Generator::new(GENERATOR_ID, &config.generator, event_loop.clone(), tlb_handle);
        System { event_loop, load_unit, store_unit, tlb, generator }
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    pub fn tlb(&self) -> &Rc<RefCell<Tlb>> {
        &self.tlb
    }

    pub fn load_unit(&self) -> &Rc<RefCell<LoadStoreUnit>> {
        &self.load_unit
    }

    pub fn store_unit(&self) -> &Rc<RefCell<LoadStoreUnit>> {
        &self.store_unit
    }

    pub fn generator(&self) -> &Rc<RefCell<Generator>> {
        &self.generator
    }

    /// Run until no events are left. Returns the simulated time at which the run ended.
    pub fn run(&self) -> u64 {
        self.generator.borrow_mut().start();
        self.event_loop.run();
        let generator = self.generator.borrow();
        info!(
            "finished at {}ns, {} issued, {} completed",
            self.event_loop.now(),
            generator.issued(),
            generator.completed()
        );
        self.event_loop.now()
    }

    pub fn print_stats(&self, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        let generator = self.generator.borrow();
        writeln!(writer, "TIME = {}ns", self.event_loop.now())?;
        writeln!(writer, "Issued     {}", generator.issued())?;
        writeln!(writer, "Completed  {}", generator.completed())?;
        writeln!(writer)?;
        self.tlb.borrow().stats().print(writer)?;
        writeln!(writer)?;
        writeln!(writer, "LSU Load   {}", self.load_unit.borrow().stats().load)?;
        writeln!(writer, "LSU Store  {}", self.store_unit.borrow().stats().store)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(text: &str) -> Config {
        text.parse().unwrap()
    }

    fn check_drained(system: &System) {
        let generator = system.generator().borrow();
        assert!(generator.is_done());
        assert!(!generator.is_blocked());
        let tlb = system.tlb().borrow();
        assert_eq!(tlb.held(), 0);
        assert_eq!(tlb.walks().active_walks(), 0);
        let load_unit = system.load_unit().borrow();
        let store_unit = system.store_unit().borrow();
        assert_eq!(load_unit.inflight(AccessKind::Load), 0);
        assert_eq!(store_unit.inflight(AccessKind::Store), 0);
        assert_eq!(store_unit.stats().load, 0);
        assert_eq!(load_unit.stats().load + store_unit.stats().store, generator.issued());
    }

    #[test]
    fn test_default_run_completes() {
        let system = System::new(&config("[generator]\ncount = 500\n"));
        system.run();
        check_drained(&system);
        let tlb = system.tlb().borrow();
        assert_eq!(tlb.stats().hit + tlb.stats().miss, 500);
    }

    #[test]
    fn test_tight_limits_complete() {
        let system = System::new(&config(
            "[tlb]\nsize = 4\nwalkers = 1\nmax_loads = 1\nmax_stores = 1\n\
             [memory]\nmax_loads = 1\nmax_stores = 1\nlatency = 7\n\
             [generator]\ncount = 300\nmax_address = 65536\n",
        ));
        system.run();
        check_drained(&system);
        let tlb = system.tlb().borrow();
        assert!(tlb.stats().block > 0);
        assert!(tlb.stats().stall > 0);
    }

    #[test]
    fn test_disabled_tlb_never_walks() {
        let system = System::new(&config("[tlb]\nsize = 0\n[generator]\ncount = 200\n"));
        system.run();
        check_drained(&system);
        let tlb = system.tlb().borrow();
        assert_eq!(tlb.stats().hit, 200);
        assert_eq!(tlb.stats().walk, 0);
    }

    #[test]
    fn test_print_stats() {
        let system = System::new(&config("[generator]\ncount = 10\n"));
        system.run();
        let mut out = Vec::new();
        system.print_stats(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Completed  10"));
        assert!(out.contains("TLB Walk"));
    }
}
