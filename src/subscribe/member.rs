// ============================================================================
// pathbind - Member Subscription Registry
//
// Shares change subscriptions across bindings: however many bindings watch
// the same (object, member) pair, the object sees exactly one underlying
// subscription. The registry probes the object's capabilities once, when the
// entry is created:
//
// 1. A member-changed signal (the notify protocol), filtered to the member.
// 2. A declared event named "<member>Changed", falling back to "Changed".
// 3. Nothing - the entry exists but only fires via explicit invalidate().
//
// Entries are ref-counted by token: disposing the last token tears down the
// underlying subscription and drops the entry.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::core::dispose::{Dispose, DisposeHandle};
use crate::core::value::{object_key, DataObject};

// =============================================================================
// TYPES
// =============================================================================

pub type MemberChangeFn = Rc<dyn Fn()>;

/// How an entry learned to observe its member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// The object exposes a member-changed signal.
    Notify,
    /// The object declares a change event by naming convention.
    Convention(String),
    /// No change source found; only invalidate() fires this entry.
    Unobserved,
}

type EntryKey = (usize, String);

struct Entry {
    strategy: Strategy,
    underlying: Option<DisposeHandle>,
    subscribers: Vec<(u64, MemberChangeFn)>,
    /// Change id of the last forced invalidation delivered to this entry.
    last_change: Cell<Option<u64>>,
}

struct RegistryInner {
    entries: RefCell<HashMap<EntryKey, Entry>>,
    next_id: Cell<u64>,
    next_change: Cell<u64>,
}

impl RegistryInner {
    /// Snapshot the entry's callbacks, then invoke outside the borrow so a
    /// callback may subscribe or unsubscribe re-entrantly.
    fn fan_out(&self, key: &EntryKey) {
        let snapshot: Vec<MemberChangeFn> = match self.entries.borrow().get(key) {
            Some(entry) => entry.subscribers.iter().map(|(_, cb)| cb.clone()).collect(),
            None => return,
        };
        for callback in snapshot {
            callback();
        }
    }
}

// =============================================================================
// TOKEN
// =============================================================================

struct MemberToken {
    registry: Weak<RegistryInner>,
    key: EntryKey,
    id: u64,
    done: Cell<bool>,
}

impl Dispose for MemberToken {
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
                entries.remove(&self.key).and_then(|entry| entry.underlying)
            } else {
                None
            }
        };
        // Torn down outside the borrow; the source may raise during teardown
        if let Some(handle) = underlying {
            handle.dispose();
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Ref-counted member-changed subscriptions, one underlying subscription per
/// (object, member) pair.
#[derive(Clone)]
pub struct MemberRegistry {
    inner: Rc<RegistryInner>,
}

impl MemberRegistry {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                entries: RefCell::new(HashMap::new()),
                next_id: Cell::new(1),
                next_change: Cell::new(1),
            }),
        }
    }

    /// Subscribe to changes of `member` on `target`. The first subscriber
    /// for a pair creates the underlying subscription; the returned token
    /// releases this subscriber's share of it.
    pub fn subscribe(
        &self,
        target: &Rc<dyn DataObject>,
        member: &str,
        callback: MemberChangeFn,
    ) -> DisposeHandle {
        let key: EntryKey = (object_key(target), member.to_string());

        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        let present = self.inner.entries.borrow().contains_key(&key);
        if !present {
            // Probe outside the borrow: attaching the underlying subscription
            // runs foreign code.
            let (strategy, underlying) = self.attach(target, member, &key);
            self.inner.entries.borrow_mut().insert(
                key.clone(),
                Entry {
                    strategy,
                    underlying,
                    subscribers: Vec::new(),
                    last_change: Cell::new(None),
                },
            );
        }

        if let Some(entry) = self.inner.entries.borrow_mut().get_mut(&key) {
            entry.subscribers.push((id, callback));
        }

        tracing::trace!(member, id, "member subscription added");

        Rc::new(MemberToken {
            registry: Rc::downgrade(&self.inner),
            key,
            id,
            done: Cell::new(false),
        })
    }

    fn attach(
        &self,
        target: &Rc<dyn DataObject>,
        member: &str,
        key: &EntryKey,
    ) -> (Strategy, Option<DisposeHandle>) {
        if let Some(signal) = target.notify() {
            let registry = Rc::downgrade(&self.inner);
            let key = key.clone();
            let watched = member.to_string();
            let handle = signal.subscribe(Rc::new(move |changed: &str| {
                if changed != watched {
                    return;
                }
                if let Some(inner) = registry.upgrade() {
                    inner.fan_out(&key);
                }
            }));
            return (Strategy::Notify, Some(handle));
        }

        if let Some(events) = target.events() {
            for name in [format!("{member}Changed"), "Changed".to_string()] {
                let registry = Rc::downgrade(&self.inner);
                let key = key.clone();
                let subscribed = events.subscribe(
                    &name,
                    Rc::new(move |_payload| {
                        if let Some(inner) = registry.upgrade() {
                            inner.fan_out(&key);
                        }
                    }),
                );
                if let Some(handle) = subscribed {
                    return (Strategy::Convention(name), Some(handle));
                }
            }
        }

        tracing::debug!(member, "no change source on target, entry is poll-only");
        (Strategy::Unobserved, None)
    }

    /// Fresh id for a forced invalidation. One id covers one logical change,
    /// however many pairs it is delivered to.
    pub fn allocate_change_id(&self) -> u64 {
        let id = self.inner.next_change.get();
        self.inner.next_change.set(id + 1);
        id
    }

    /// Fire every subscriber of a pair as if the member had raised a change.
    /// This is how poll-only entries and internal write echoes propagate.
    /// The change id distinguishes forced invalidations: an id the entry has
    /// already seen is dropped, which breaks re-entrant invalidation cycles.
    pub fn invalidate(&self, target: &Rc<dyn DataObject>, member: &str, change_id: u64) {
        let key: EntryKey = (object_key(target), member.to_string());
        {
            let entries = self.inner.entries.borrow();
            let Some(entry) = entries.get(&key) else {
                return;
            };
            if entry.last_change.get() == Some(change_id) {
                tracing::trace!(member, change_id, "invalidation already delivered");
                return;
            }
            entry.last_change.set(Some(change_id));
        }
        self.inner.fan_out(&key);
    }

    pub fn subscriber_count(&self, target: &Rc<dyn DataObject>, member: &str) -> usize {
        let key: EntryKey = (object_key(target), member.to_string());
        self.inner
            .entries
            .borrow()
            .get(&key)
            .map_or(0, |entry| entry.subscribers.len())
    }

    pub fn strategy(&self, target: &Rc<dyn DataObject>, member: &str) -> Option<Strategy> {
        let key: EntryKey = (object_key(target), member.to_string());
        self.inner
            .entries
            .borrow()
            .get(&key)
            .map(|entry| entry.strategy.clone())
    }

    pub fn entry_count(&self) -> usize {
        self.inner.entries.borrow().len()
    }
}

impl Default for MemberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
