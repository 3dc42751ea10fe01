//! This module handles event-driven simulation

use super::unit::{UnitHandle, UnitId};
use std::cell::{Cell, RefCell};
use std::collections::BinaryHeap;

pub type Handler = Box<dyn FnOnce()>;

struct Entry {
    time: u64,
    seq: u64,
    handler: Handler,
}

// #region Ordering relation for Entry
//

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Smaller time needs to come larger as BinaryHeap is a max-heap. Among events queued for
        // the same time, the one queued first must come out first.
        other.time.cmp(&self.time).then_with(|| other.seq.cmp(&self.seq))
    }
}

//
// #endregion

/// The scheduling capability units need from the simulation.
///
/// All times are in simulated nanoseconds.
pub trait Scheduler {
    /// Query the current simulated time.
    fn now(&self) -> u64;

    /// Invoke `handler` once, no earlier than `now() + delay`.
    fn schedule_after(&self, delay: u64, handler: Handler);

    /// Notify `target` that `from` can accept requests again.
    fn schedule_resume(&self, delay: u64, target: &UnitHandle, from: UnitId) {
        let target = target.clone();
        self.schedule_after(
            delay,
            Box::new(move || {
                // A unit dropped before the notification lands has nobody left to resume.
                if let Some(unit) = target.upgrade() {
                    unit.borrow_mut().resume(from);
                }
            }),
        );
    }
}

/// A single-threaded discrete event loop.
pub struct EventLoop {
    time: Cell<u64>,
    seq: Cell<u64>,
    events: RefCell<BinaryHeap<Entry>>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Create a new event loop.
    pub fn new() -> EventLoop {
        EventLoop { time: Cell::new(0), seq: Cell::new(0), events: RefCell::new(BinaryHeap::new()) }
    }

    /// Add a new event to the event loop for triggering. If it happens in the past it will be
    /// triggered on the next step, without moving time backwards.
    pub fn queue(&self, time: u64, handler: Handler) {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.events.borrow_mut().push(Entry { time, seq, handler });
    }

    /// Number of events not yet triggered.
    pub fn pending(&self) -> usize {
        self.events.borrow().len()
    }

    /// Time of the next event, if any.
    pub fn next_event(&self) -> Option<u64> {
        self.events.borrow().peek().map(|entry| entry.time)
    }

    /// Trigger the earliest event. Returns false if there is nothing left to do.
    pub fn step(&self) -> bool {
        // The heap must not stay borrowed while the handler runs, as handlers queue new events.
        let entry = match self.events.borrow_mut().pop() {
            None => return false,
            Some(v) => v,
        };
        if entry.time > self.time.get() {
            self.time.set(entry.time);
        }
        (entry.handler)();
        true
    }

    /// Handle all events until the queue drains.
    pub fn run(&self) {
        while self.step() {}
    }

    /// Handle all events at or before `time`, then advance time to `time`.
    pub fn run_until(&self, time: u64) {
        while let Some(next) = self.next_event() {
            if next > time {
                break;
            }
            self.step();
        }
        if time > self.time.get() {
            self.time.set(time);
        }
    }
}

impl Scheduler for EventLoop {
    fn now(&self) -> u64 {
        self.time.get()
    }

    fn schedule_after(&self, delay: u64, handler: Handler) {
        self.queue(self.time.get() + delay, handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_time_order() {
        let event_loop = EventLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for &(delay, tag) in &[(30, 'c'), (10, 'a'), (20, 'b')] {
            let log = log.clone();
            event_loop.schedule_after(delay, Box::new(move || log.borrow_mut().push(tag)));
        }
        event_loop.run();
        assert_eq!(*log.borrow(), vec!['a', 'b', 'c']);
        assert_eq!(event_loop.now(), 30);
    }

    #[test]
    fn test_equal_time_is_fifo() {
        let event_loop = EventLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..16 {
            let log = log.clone();
            event_loop.schedule_after(5, Box::new(move || log.borrow_mut().push(i)));
        }
        event_loop.run();
        assert_eq!(*log.borrow(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_handler_can_schedule() {
        let event_loop = Rc::new(EventLoop::new());
        let fired = Rc::new(Cell::new(0));
        let inner_loop = event_loop.clone();
        let inner_fired = fired.clone();
        event_loop.schedule_after(
            10,
            Box::new(move || {
                let fired = inner_fired.clone();
                inner_loop.schedule_after(10, Box::new(move || fired.set(fired.get() + 1)));
            }),
        );
        event_loop.run();
        assert_eq!(fired.get(), 1);
        assert_eq!(event_loop.now(), 20);
    }

    #[test]
    fn test_run_until() {
        let event_loop = EventLoop::new();
        let fired = Rc::new(Cell::new(false));
        let inner = fired.clone();
        event_loop.schedule_after(20, Box::new(move || inner.set(true)));
        event_loop.run_until(15);
        assert!(!fired.get());
        assert_eq!(event_loop.now(), 15);
        event_loop.run_until(20);
        assert!(fired.get());
        assert_eq!(event_loop.pending(), 0);
    }
}
