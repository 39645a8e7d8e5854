// ============================================================================
// pathbind - Collection Subscription Registry
//
// Same ref-counting contract as the member registry, keyed by list identity:
// one underlying list subscription per observed list, fanned out to every
// binding watching it. Raw list events are normalized into the typed
// CollectionChange model on the way through.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::core::dispose::{Dispose, DisposeHandle};
use crate::core::events::{ListEvent, ObservableList};
use crate::core::value::Value;
use crate::diff::CollectionChange;

// =============================================================================
// TYPES
// =============================================================================

pub type CollectionChangeFn = Rc<dyn Fn(&CollectionChange<Value>)>;

fn list_key(list: &Rc<ObservableList>) -> usize {
    Rc::as_ptr(list) as usize
}

/// Raw list events carry everything a positional mirror needs except Reset,
/// which reports no positions and so maps to Invalidate.
fn normalize(event: &ListEvent) -> CollectionChange<Value> {
    match event {
        ListEvent::Added { items, index } => CollectionChange::Insert {
            index: *index,
            items: items.clone(),
        },
        ListEvent::Removed { items, index } => CollectionChange::Remove {
            index: *index,
            items: items.clone(),
        },
        ListEvent::Replaced { old, new, index } => CollectionChange::Replace {
            index: *index,
            old: old.clone(),
            new: new.clone(),
        },
        ListEvent::Moved { from, to } => CollectionChange::Move {
            from: *from,
            to: *to,
        },
        ListEvent::Cleared => CollectionChange::Clear,
        ListEvent::Reset => CollectionChange::Invalidate,
    }
}

struct Entry {
    underlying: DisposeHandle,
    subscribers: Vec<(u64, CollectionChangeFn)>,
}

struct RegistryInner {
    entries: RefCell<HashMap<usize, Entry>>,
    next_id: Cell<u64>,
}

impl RegistryInner {
    fn fan_out(&self, key: usize, change: &CollectionChange<Value>) {
        let snapshot: Vec<CollectionChangeFn> = match self.entries.borrow().get(&key) {
            Some(entry) => entry.subscribers.iter().map(|(_, cb)| cb.clone()).collect(),
            None => return,
        };
        for callback in snapshot {
            callback(change);
        }
    }
}

// =============================================================================
// TOKEN
// =============================================================================

struct CollectionToken {
    registry: Weak<RegistryInner>,
    key: usize,
    id: u64,
    done: Cell<bool>,
}

impl Dispose for CollectionToken {
    fn dispose(&self) {
        if self.done.replace(true) {
            return;
        }
        let Some(inner) = self.registry.upgrade() else {
            return;
        };
        let underlying = {
            let mut entries = inner.entries.borrow_mut();
            let Some(entry) = entries.get_mut(&self.key) else {
                return;
            };
            entry.subscribers.retain(|(id, _)| *id != self.id);
            if entry.subscribers.is_empty() {
                entries.remove(&self.key).map(|entry| entry.underlying)
            } else {
                None
            }
        };
        if let Some(handle) = underlying {
            handle.dispose();
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Ref-counted collection-changed subscriptions, one underlying list
/// subscription per observed list.
#[derive(Clone)]
pub struct CollectionRegistry {
    inner: Rc<RegistryInner>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                entries: RefCell::new(HashMap::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    pub fn subscribe(
        &self,
        list: &Rc<ObservableList>,
        callback: CollectionChangeFn,
    ) -> DisposeHandle {
        let key = list_key(list);

        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        let present = self.inner.entries.borrow().contains_key(&key);
        if !present {
            let registry = Rc::downgrade(&self.inner);
            let underlying = list.subscribe(Rc::new(move |event: &ListEvent| {
                if let Some(inner) = registry.upgrade() {
                    inner.fan_out(key, &normalize(event));
                }
            }));
            self.inner.entries.borrow_mut().insert(
                key,
                Entry {
                    underlying,
                    subscribers: Vec::new(),
                },
            );
        }

        if let Some(entry) = self.inner.entries.borrow_mut().get_mut(&key) {
            entry.subscribers.push((id, callback));
        }

        tracing::trace!(id, "collection subscription added");

        Rc::new(CollectionToken {
            registry: Rc::downgrade(&self.inner),
            key,
            id,
            done: Cell::new(false),
        })
    }

    pub fn subscriber_count(&self, list: &Rc<ObservableList>) -> usize {
        self.inner
            .entries
            .borrow()
            .get(&list_key(list))
            .map_or(0, |entry| entry.subscribers.len())
    }

    pub fn entry_count(&self) -> usize {
        self.inner.entries.borrow().len()
    }
}

impl Default for CollectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
