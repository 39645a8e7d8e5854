// ============================================================================
// pathbind - Binding Services
//
// The constructor-injected bundle shared by one binding graph: the
// subscription registries, the fault sink, and binding id allocation.
// ============================================================================
//
// Deliberately NOT a process-wide singleton: independent binding graphs
// (tests in particular) each get their own services and never interfere.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use super::dispose::{Dispose, DisposeHandle};
use super::error::{CatchFault, PanicSink};
use crate::subscribe::{CollectionRegistry, MemberRegistry};

// =============================================================================
// SCHEDULER
// =============================================================================

/// Defers a side's evaluation onto another execution context.
/// The returned handle cancels the action if it has not run yet.
pub trait Schedule {
    fn schedule(&self, action: Box<dyn FnOnce()>) -> DisposeHandle;
}

/// A scheduler whose queue is pumped manually. Used in tests and anywhere
/// deferred evaluation should be driven explicitly.
pub struct ManualScheduler {
    queue: RefCell<VecDeque<ScheduledAction>>,
}

struct ScheduledAction {
    cancelled: Rc<Cell<bool>>,
    action: Box<dyn FnOnce()>,
}

impl ManualScheduler {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            queue: RefCell::new(VecDeque::new()),
        })
    }

    /// Number of actions waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Run the next scheduled action. Returns whether one ran.
    pub fn run_one(&self) -> bool {
        loop {
            let next = self.queue.borrow_mut().pop_front();
            match next {
                Some(scheduled) => {
                    if scheduled.cancelled.get() {
                        continue;
                    }
                    (scheduled.action)();
                    return true;
                }
                None => return false,
            }
        }
    }

    /// Drain the queue, including actions scheduled while draining.
    pub fn run_all(&self) {
        while self.run_one() {}
    }
}

impl Schedule for ManualScheduler {
    fn schedule(&self, action: Box<dyn FnOnce()>) -> DisposeHandle {
        let cancelled = Rc::new(Cell::new(false));
        self.queue.borrow_mut().push_back(ScheduledAction {
            cancelled: cancelled.clone(),
            action,
        });
        Rc::new(CancelScheduled { cancelled })
    }
}

struct CancelScheduled {
    cancelled: Rc<Cell<bool>>,
}

impl Dispose for CancelScheduled {
    fn dispose(&self) {
        self.cancelled.set(true);
    }
}

// =============================================================================
// BINDING SERVICES
// =============================================================================

/// Everything a binding graph shares: registries, the fault sink, and
/// binding id allocation.
pub struct BindingServices {
    members: MemberRegistry,
    collections: CollectionRegistry,
    sink: RefCell<Rc<dyn CatchFault>>,
    next_binding_id: Cell<u64>,
}

impl BindingServices {
    /// Services with the default sink (re-raises faults on the caller's
    /// thread).
    pub fn new() -> Rc<Self> {
        Self::with_sink(Rc::new(PanicSink))
    }

    pub fn with_sink(sink: Rc<dyn CatchFault>) -> Rc<Self> {
        Rc::new(Self {
            members: MemberRegistry::new(),
            collections: CollectionRegistry::new(),
            sink: RefCell::new(sink),
            next_binding_id: Cell::new(1),
        })
    }

    pub fn members(&self) -> &MemberRegistry {
        &self.members
    }

    pub fn collections(&self) -> &CollectionRegistry {
        &self.collections
    }

    pub fn sink(&self) -> Rc<dyn CatchFault> {
        self.sink.borrow().clone()
    }

    pub fn set_sink(&self, sink: Rc<dyn CatchFault>) {
        *self.sink.borrow_mut() = sink;
    }

    pub(crate) fn allocate_binding_id(&self) -> u64 {
        let id = self.next_binding_id.get();
        self.next_binding_id.set(id + 1);
        id
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_scheduler_runs_in_order() {
        let scheduler = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            let _ = scheduler.schedule(Box::new(move || log.borrow_mut().push(i)));
        }

        assert_eq!(scheduler.pending(), 3);
        scheduler.run_all();
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn cancelled_action_is_skipped() {
        let scheduler = ManualScheduler::new();
        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();

        let handle = scheduler.schedule(Box::new(move || ran_clone.set(true)));
        handle.dispose();

        assert!(!scheduler.run_one());
        assert!(!ran.get());
    }

    #[test]
    fn actions_scheduled_while_draining_still_run() {
        let scheduler = ManualScheduler::new();
        let count = Rc::new(Cell::new(0));

        let count_outer = count.clone();
        let scheduler_clone = scheduler.clone();
        let _ = scheduler.schedule(Box::new(move || {
            count_outer.set(count_outer.get() + 1);
            let count_inner = count_outer.clone();
            let _ = scheduler_clone.schedule(Box::new(move || {
                count_inner.set(count_inner.get() + 1);
            }));
        }));

        scheduler.run_all();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn binding_ids_are_unique() {
        let services = BindingServices::new();
        let a = services.allocate_binding_id();
        let b = services.allocate_binding_id();
        assert_ne!(a, b);
    }
}
