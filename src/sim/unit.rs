use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Identifier of a simulated unit. Only used for routing `resume` notifications and logging.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum AccessKind {
    Load,
    Store,
}

/// A single memory request travelling through the pipeline.
#[derive(Clone, Debug)]
pub struct MemReq {
    /// Process the virtual address belongs to.
    pub pid: u32,
    pub addr: u64,
    pub length: u64,
}

/// Invoked once by the unit that finally services a request.
pub type Callback = Box<dyn FnOnce()>;

/// A component of the memory pipeline.
///
/// Both `load` and `store` return whether the caller is now blocked. A blocked caller must not
/// send further requests of that kind until it receives `resume` from this unit.
pub trait Unit {
    fn load(&mut self, src: &UnitHandle, req: MemReq, callback: Callback) -> bool {
        let _ = (src, req, callback);
        unimplemented!("unit does not accept loads")
    }

    fn store(&mut self, src: &UnitHandle, req: MemReq, callback: Callback) -> bool {
        let _ = (src, req, callback);
        unimplemented!("unit does not accept stores")
    }

    /// `from` can accept requests again.
    fn resume(&mut self, from: UnitId) {
        let _ = from;
    }
}

/// A non-owning reference to a unit.
///
/// Units reference each other in both directions (requests flow down, resumes flow up), so they
/// hold weak handles to avoid reference cycles. The owner of the simulation keeps the strong ones.
#[derive(Clone)]
pub struct UnitHandle {
    id: UnitId,
    unit: Weak<RefCell<dyn Unit>>,
}

impl UnitHandle {
    pub fn new<U: Unit + 'static>(id: UnitId, unit: &Rc<RefCell<U>>) -> Self {
        let unit: Rc<RefCell<dyn Unit>> = unit.clone();
        UnitHandle { id, unit: Rc::downgrade(&unit) }
    }

    pub fn from_weak(id: UnitId, unit: Weak<RefCell<dyn Unit>>) -> Self {
        UnitHandle { id, unit }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn upgrade(&self) -> Option<Rc<RefCell<dyn Unit>>> {
        self.unit.upgrade()
    }

    fn unit(&self) -> Rc<RefCell<dyn Unit>> {
        match self.unit.upgrade() {
            Some(v) => v,
            None => panic!("unit {} used after it was dropped", self.id),
        }
    }

    /// Send a load to the referenced unit.
    pub fn load(&self, src: &UnitHandle, req: MemReq, callback: Callback) -> bool {
        self.unit().borrow_mut().load(src, req, callback)
    }

    /// Send a store to the referenced unit.
    pub fn store(&self, src: &UnitHandle, req: MemReq, callback: Callback) -> bool {
        self.unit().borrow_mut().store(src, req, callback)
    }

    pub fn access(&self, kind: AccessKind, src: &UnitHandle, req: MemReq, callback: Callback) -> bool {
        match kind {
            AccessKind::Load => self.load(src, req, callback),
            AccessKind::Store => self.store(src, req, callback),
        }
    }
}

impl fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UnitHandle").field(&self.id).finish()
    }
}
