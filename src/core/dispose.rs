// ============================================================================
// pathbind - Disposal Primitives
//
// Release-handles and the container that groups them for batch disposal.
// ============================================================================
//
// Every revocable resource in the engine (a subscription token, an in-flight
// evaluation, a scheduled action) is handed out as an Rc<dyn Dispose>.
// A DisposableContainer groups an open-ended set of such handles so that
// unbind/dispose releases everything created during a binding's lifetime
// exactly once.
//
// Key contracts:
// - add() on an already-disposed container disposes the handle immediately
//   (a handle is never silently dropped)
// - clear() disposes and removes all current handles without disposing the
//   container itself; used every re-evaluation cycle
// - dispose() is idempotent
// - handles are always disposed after the interior borrow is released, so a
//   disposal callback may re-enter the container
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

// =============================================================================
// DISPOSE TRAIT
// =============================================================================

/// A release-handle. Implementations must be idempotent: calling `dispose`
/// a second time is a no-op.
pub trait Dispose {
    fn dispose(&self);
}

/// Shared ownership of a release-handle.
pub type DisposeHandle = Rc<dyn Dispose>;

// =============================================================================
// DISPOSE FN - closure-backed handle
// =============================================================================

/// A release-handle backed by a one-shot closure.
pub struct DisposeFn {
    action: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl DisposeFn {
    /// Wrap a closure as a dispose handle. The closure runs at most once.
    pub fn new(action: impl FnOnce() + 'static) -> DisposeHandle {
        Rc::new(Self {
            action: RefCell::new(Some(Box::new(action))),
        })
    }
}

impl Dispose for DisposeFn {
    fn dispose(&self) {
        if let Some(action) = self.action.borrow_mut().take() {
            action();
        }
    }
}

// =============================================================================
// DISPOSABLE CONTAINER
// =============================================================================

/// A mutable group of release-handles supporting add/remove/clear/dispose-all.
///
/// Used both as a binding's permanent resource owner and, per side, as a
/// short-lived scratch container cleared and rebuilt on every re-evaluation.
///
/// Capacity bookkeeping: the container remembers the high-water capacity it
/// grew to; once occupancy falls below half of it, the backing storage is
/// shrunk to fit. This bounds memory for long-lived, churn-heavy bindings.
pub struct DisposableContainer {
    handles: RefCell<Vec<DisposeHandle>>,
    disposed: Cell<bool>,
    grow_threshold: Cell<usize>,
}

impl DisposableContainer {
    pub fn new() -> Self {
        Self {
            handles: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
            grow_threshold: Cell::new(0),
        }
    }

    /// Number of handles currently held.
    pub fn len(&self) -> usize {
        self.handles.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.borrow().is_empty()
    }

    /// Whether the container itself has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Add a handle to the container.
    ///
    /// If the container is already disposed the handle is disposed
    /// immediately instead of being stored.
    pub fn add(&self, handle: DisposeHandle) {
        if self.disposed.get() {
            handle.dispose();
            return;
        }
        let mut handles = self.handles.borrow_mut();
        handles.push(handle);
        if handles.capacity() > self.grow_threshold.get() {
            self.grow_threshold.set(handles.capacity());
        }
    }

    /// Dispose and remove the first handle matching `handle` by identity.
    /// Returns whether a match was found.
    pub fn remove(&self, handle: &DisposeHandle) -> bool {
        let found = {
            let mut handles = self.handles.borrow_mut();
            let pos = handles.iter().position(|h| Rc::ptr_eq(h, handle));
            match pos {
                Some(i) => {
                    handles.remove(i);
                    Self::maybe_shrink(&mut handles, &self.grow_threshold);
                    true
                }
                None => false,
            }
        };
        if found {
            // Outside the borrow: the handle may re-enter the container.
            handle.dispose();
        }
        found
    }

    /// Dispose and remove all current handles. The container stays usable.
    pub fn clear(&self) {
        let drained: Vec<DisposeHandle> = {
            let mut handles = self.handles.borrow_mut();
            let drained = std::mem::take(&mut *handles);
            self.grow_threshold.set(0);
            drained
        };
        for handle in drained {
            handle.dispose();
        }
    }

    /// Dispose the container and every handle in it, exactly once.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.clear();
    }

    fn maybe_shrink(handles: &mut Vec<DisposeHandle>, threshold: &Cell<usize>) {
        let limit = threshold.get() / 2;
        if limit > 0 && handles.len() < limit {
            handles.shrink_to_fit();
            threshold.set(handles.capacity());
        }
    }
}

impl Default for DisposableContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispose for DisposableContainer {
    fn dispose(&self) {
        DisposableContainer::dispose(self);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_handle(count: &Rc<Cell<u32>>) -> DisposeHandle {
        let count = count.clone();
        DisposeFn::new(move || count.set(count.get() + 1))
    }

    #[test]
    fn dispose_fn_runs_once() {
        let count = Rc::new(Cell::new(0));
        let handle = counting_handle(&count);

        handle.dispose();
        handle.dispose();

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn clear_disposes_all_and_stays_usable() {
        let count = Rc::new(Cell::new(0));
        let container = DisposableContainer::new();

        container.add(counting_handle(&count));
        container.add(counting_handle(&count));
        assert_eq!(container.len(), 2);

        container.clear();
        assert_eq!(count.get(), 2);
        assert!(container.is_empty());
        assert!(!container.is_disposed());

        // Still accepts handles after clear
        container.add(counting_handle(&count));
        assert_eq!(container.len(), 1);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn dispose_is_idempotent() {
        let count = Rc::new(Cell::new(0));
        let container = DisposableContainer::new();

        container.add(counting_handle(&count));
        container.dispose();
        container.dispose();

        assert_eq!(count.get(), 1);
        assert!(container.is_disposed());
    }

    #[test]
    fn add_after_dispose_disposes_immediately() {
        let count = Rc::new(Cell::new(0));
        let container = DisposableContainer::new();
        container.dispose();

        container.add(counting_handle(&count));

        assert_eq!(count.get(), 1);
        assert!(container.is_empty());
    }

    #[test]
    fn remove_disposes_first_match_only() {
        let count = Rc::new(Cell::new(0));
        let container = DisposableContainer::new();

        let a = counting_handle(&count);
        let b = counting_handle(&count);
        container.add(a.clone());
        container.add(b.clone());

        assert!(container.remove(&a));
        assert_eq!(count.get(), 1);
        assert_eq!(container.len(), 1);

        // Removing again finds nothing
        assert!(!container.remove(&a));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn handle_may_reenter_container_on_dispose() {
        let container = Rc::new(DisposableContainer::new());
        let container_clone = container.clone();
        let nested_disposed = Rc::new(Cell::new(false));
        let nested_clone = nested_disposed.clone();

        // Disposing this handle adds a new handle to the same container.
        let reentrant = DisposeFn::new(move || {
            let nested = nested_clone.clone();
            container_clone.add(DisposeFn::new(move || nested.set(true)));
        });
        container.add(reentrant);

        container.clear();

        // The nested handle landed after the drain and was not disposed by it
        assert_eq!(container.len(), 1);
        assert!(!nested_disposed.get());
    }

    #[test]
    fn storage_shrinks_after_heavy_churn() {
        let container = DisposableContainer::new();

        let handles: Vec<DisposeHandle> =
            (0..128).map(|_| DisposeFn::new(|| {})).collect();
        for h in &handles {
            container.add(h.clone());
        }
        let grown = container.handles.borrow().capacity();
        assert!(grown >= 128);

        // Remove most of them; occupancy drops below half the threshold
        for h in handles.iter().take(120) {
            container.remove(h);
        }
        let shrunk = container.handles.borrow().capacity();
        assert!(shrunk < grown, "capacity {shrunk} should shrink below {grown}");
        assert_eq!(container.len(), 8);
    }
}
