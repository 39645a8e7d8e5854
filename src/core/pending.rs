// ============================================================================
// pathbind - Pending Values
//
// A cancellable future with exactly-once resolution semantics.
// ============================================================================
//
// A Pending<T> represents an asynchronous intermediate value met during path
// evaluation. Continuations registered before resolution fire once, after
// resolution; continuations registered after resolution fire immediately.
//
// Resumed continuations are queued rather than invoked re-entrantly: a
// continuation that itself resolves or subscribes never runs nested inside
// another continuation of the same pending.
//
// Cancellation is best-effort through the handle returned by subscribe():
// a continuation that already fired cannot be un-fired.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use super::dispose::{Dispose, DisposeHandle};

// =============================================================================
// PENDING INNER
// =============================================================================

struct Waiter<T> {
    cancelled: Rc<Cell<bool>>,
    continuation: Box<dyn FnOnce(T)>,
}

struct PendingInner<T> {
    value: RefCell<Option<T>>,
    waiters: RefCell<Vec<Waiter<T>>>,
    /// Continuations ready to run. Drained by whoever is not already draining.
    run_queue: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    dispatching: Cell<bool>,
}

// =============================================================================
// PENDING
// =============================================================================

/// A value that resolves exactly once, some time after it is created.
pub struct Pending<T> {
    inner: Rc<PendingInner<T>>,
}

impl<T> Clone for Pending<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Pending<T> {
    /// Create an unresolved pending value.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(PendingInner {
                value: RefCell::new(None),
                waiters: RefCell::new(Vec::new()),
                run_queue: RefCell::new(VecDeque::new()),
                dispatching: Cell::new(false),
            }),
        }
    }

    /// Create an already-resolved pending value.
    pub fn resolved(value: T) -> Self {
        let pending = Self::new();
        pending.resolve(value);
        pending
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Resolve the value. Returns false (and does nothing) if already
    /// resolved - resolution happens exactly once.
    pub fn resolve(&self, value: T) -> bool {
        {
            let mut slot = self.inner.value.borrow_mut();
            if slot.is_some() {
                return false;
            }
            *slot = Some(value.clone());
        }

        let waiters: Vec<Waiter<T>> = self.inner.waiters.borrow_mut().drain(..).collect();
        {
            let mut queue = self.inner.run_queue.borrow_mut();
            for waiter in waiters {
                let value = value.clone();
                queue.push_back(Box::new(move || {
                    if !waiter.cancelled.get() {
                        (waiter.continuation)(value);
                    }
                }));
            }
        }
        self.drain();
        true
    }

    /// Register a continuation, returning a handle that cancels it.
    ///
    /// If the value is already resolved the continuation is queued to run
    /// immediately (still through the queue, never nested inside another
    /// continuation).
    pub fn subscribe(&self, continuation: impl FnOnce(T) + 'static) -> DisposeHandle {
        let cancelled = Rc::new(Cell::new(false));

        let resolved = self.inner.value.borrow().clone();
        match resolved {
            Some(value) => {
                let flag = cancelled.clone();
                let continuation = Box::new(continuation);
                self.inner.run_queue.borrow_mut().push_back(Box::new(move || {
                    if !flag.get() {
                        continuation(value);
                    }
                }));
                self.drain();
            }
            None => {
                self.inner.waiters.borrow_mut().push(Waiter {
                    cancelled: cancelled.clone(),
                    continuation: Box::new(continuation),
                });
            }
        }

        Rc::new(CancelContinuation { cancelled })
    }

    /// Run queued continuations unless a drain is already in progress higher
    /// up the stack (that drain will pick up anything we queued).
    fn drain(&self) {
        if self.inner.dispatching.replace(true) {
            return;
        }
        loop {
            let job = self.inner.run_queue.borrow_mut().pop_front();
            match job {
                Some(job) => job(),
                None => break,
            }
        }
        self.inner.dispatching.set(false);
    }
}

impl<T: Clone + 'static> Default for Pending<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.inner.value.borrow().is_some() {
            "resolved"
        } else {
            "pending"
        };
        f.debug_struct("Pending").field("state", &state).finish()
    }
}

struct CancelContinuation {
    cancelled: Rc<Cell<bool>>,
}

impl Dispose for CancelContinuation {
    fn dispose(&self) {
        self.cancelled.set(true);
    }
}

// =============================================================================
// TESTS
// =============================================================================
