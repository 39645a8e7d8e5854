// ============================================================================
// pathbind - Change-Notification Protocols
//
// The inbound collaborator contracts: the standard member-changed signal,
// the named-event table for convention-based subscription, and the
// observable list with its raw collection-changed events.
// ============================================================================
//
// All three hubs follow the same re-entrancy rule: the subscriber list is
// snapshotted before callbacks run, so a callback may subscribe or
// unsubscribe without poisoning the iteration.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::dispose::{Dispose, DisposeHandle};
use super::value::Value;

// =============================================================================
// MEMBER CHANGED SIGNAL - the standard notification protocol
// =============================================================================

pub type MemberChangedFn = Rc<dyn Fn(&str)>;

struct MemberChangedState {
    subscribers: RefCell<Vec<(u64, MemberChangedFn)>>,
    next_id: Cell<u64>,
}

/// The standard "member changed" signal: callbacks receive the member name.
pub struct MemberChangedSignal {
    state: Rc<MemberChangedState>,
}

impl MemberChangedSignal {
    pub fn new() -> Self {
        Self {
            state: Rc::new(MemberChangedState {
                subscribers: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    pub fn subscribe(&self, callback: MemberChangedFn) -> DisposeHandle {
        let id = self.state.next_id.get();
        self.state.next_id.set(id + 1);
        self.state.subscribers.borrow_mut().push((id, callback));

        let state = self.state.clone();
        Rc::new(Unsubscribe {
            done: Cell::new(false),
            remove: Box::new(move || {
                state.subscribers.borrow_mut().retain(|(sid, _)| *sid != id);
            }),
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.subscribers.borrow().len()
    }

    pub fn raise(&self, member: &str) {
        let snapshot: Vec<MemberChangedFn> = self
            .state
            .subscribers
            .borrow()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in snapshot {
            callback(member);
        }
    }
}

impl Default for MemberChangedSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Removal token shared by all three hubs.
struct Unsubscribe {
    done: Cell<bool>,
    remove: Box<dyn Fn()>,
}

impl Dispose for Unsubscribe {
    fn dispose(&self) {
        if !self.done.replace(true) {
            (self.remove)();
        }
    }
}

// =============================================================================
// EVENT TABLE - declared named events for the convention fallback
// =============================================================================

pub type EventFn = Rc<dyn Fn(&Value)>;

struct EventTableState {
    events: RefCell<HashMap<String, Vec<(u64, EventFn)>>>,
    next_id: Cell<u64>,
}

/// A table of declared named events carrying a generic payload.
///
/// The subscription factory probes this table by conventional names
/// (`"<member>Changed"`, then `"Changed"`); only declared events can be
/// subscribed, so probing an absent convention fails cleanly.
pub struct EventTable {
    state: Rc<EventTableState>,
}

impl EventTable {
    pub fn new() -> Self {
        Self {
            state: Rc::new(EventTableState {
                events: RefCell::new(HashMap::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Declare an event name. Subscribing an undeclared name returns None.
    pub fn declare(&self, name: &str) -> &Self {
        self.state
            .events
            .borrow_mut()
            .entry(name.to_string())
            .or_default();
        self
    }

    pub fn has(&self, name: &str) -> bool {
        self.state.events.borrow().contains_key(name)
    }

    pub fn subscribe(&self, name: &str, callback: EventFn) -> Option<DisposeHandle> {
        let id = {
            let mut events = self.state.events.borrow_mut();
            let subscribers = events.get_mut(name)?;
            let id = self.state.next_id.get();
            self.state.next_id.set(id + 1);
            subscribers.push((id, callback));
            id
        };

        let state = self.state.clone();
        let name = name.to_string();
        Some(Rc::new(Unsubscribe {
            done: Cell::new(false),
            remove: Box::new(move || {
                if let Some(subscribers) = state.events.borrow_mut().get_mut(&name) {
                    subscribers.retain(|(sid, _)| *sid != id);
                }
            }),
        }))
    }

    pub fn raise(&self, name: &str, payload: &Value) {
        let snapshot: Vec<EventFn> = match self.state.events.borrow().get(name) {
            Some(subscribers) => subscribers.iter().map(|(_, cb)| cb.clone()).collect(),
            None => return,
        };
        for callback in snapshot {
            callback(payload);
        }
    }
}

impl Default for EventTable {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// OBSERVABLE LIST
// =============================================================================

/// A raw collection-changed event: action plus affected items and indices.
/// Normalized into `CollectionChange` batches by the collection registry.
#[derive(Debug, Clone)]
pub enum ListEvent {
    Added { items: Vec<Value>, index: usize },
    Removed { items: Vec<Value>, index: usize },
    Replaced { old: Value, new: Value, index: usize },
    Moved { from: usize, to: usize },
    Cleared,
    /// The content changed wholesale; observers must re-enumerate.
    Reset,
}

pub type ListEventFn = Rc<dyn Fn(&ListEvent)>;

/// A list of values raising collection-changed events on mutation.
pub struct ObservableList {
    items: RefCell<Vec<Value>>,
    subscribers: Rc<RefCell<Vec<(u64, ListEventFn)>>>,
    next_id: Cell<u64>,
}

impl ObservableList {
    pub fn new() -> Rc<Self> {
        Self::from_values(Vec::new())
    }

    pub fn from_values(items: Vec<Value>) -> Rc<Self> {
        Rc::new(Self {
            items: RefCell::new(items),
            subscribers: Rc::new(RefCell::new(Vec::new())),
            next_id: Cell::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }

    /// Snapshot of the current content.
    pub fn snapshot(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }

    pub fn subscribe(&self, callback: ListEventFn) -> DisposeHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.subscribers.borrow_mut().push((id, callback));

        // The token holds the subscriber table weakly: dropping the list
        // drops the subscription with it.
        let subscribers = Rc::downgrade(&self.subscribers);
        Rc::new(Unsubscribe {
            done: Cell::new(false),
            remove: Box::new(move || {
                if let Some(subscribers) = subscribers.upgrade() {
                    subscribers.borrow_mut().retain(|(sid, _)| *sid != id);
                }
            }),
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn push(&self, value: Value) {
        let index = {
            let mut items = self.items.borrow_mut();
            items.push(value.clone());
            items.len() - 1
        };
        self.raise(ListEvent::Added {
            items: vec![value],
            index,
        });
    }

    pub fn insert(&self, index: usize, value: Value) {
        self.items.borrow_mut().insert(index, value.clone());
        self.raise(ListEvent::Added {
            items: vec![value],
            index,
        });
    }

    pub fn insert_all(&self, index: usize, values: Vec<Value>) {
        if values.is_empty() {
            return;
        }
        {
            let mut items = self.items.borrow_mut();
            for (offset, value) in values.iter().enumerate() {
                items.insert(index + offset, value.clone());
            }
        }
        self.raise(ListEvent::Added {
            items: values,
            index,
        });
    }

    pub fn remove_at(&self, index: usize) -> Option<Value> {
        let removed = {
            let mut items = self.items.borrow_mut();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        self.raise(ListEvent::Removed {
            items: vec![removed.clone()],
            index,
        });
        Some(removed)
    }

    /// Remove the first element equal to `value`.
    pub fn remove_value(&self, value: &Value) -> bool {
        let index = self.items.borrow().iter().position(|v| v == value);
        match index {
            Some(index) => self.remove_at(index).is_some(),
            None => false,
        }
    }

    pub fn replace(&self, index: usize, value: Value) -> Option<Value> {
        let old = {
            let mut items = self.items.borrow_mut();
            if index >= items.len() {
                return None;
            }
            std::mem::replace(&mut items[index], value.clone())
        };
        self.raise(ListEvent::Replaced {
            old: old.clone(),
            new: value,
            index,
        });
        Some(old)
    }

    pub fn move_item(&self, from: usize, to: usize) -> bool {
        {
            let mut items = self.items.borrow_mut();
            if from >= items.len() || to >= items.len() {
                return false;
            }
            let value = items.remove(from);
            items.insert(to, value);
        }
        if from != to {
            self.raise(ListEvent::Moved { from, to });
        }
        true
    }

    pub fn clear(&self) {
        let was_empty = {
            let mut items = self.items.borrow_mut();
            let was_empty = items.is_empty();
            items.clear();
            was_empty
        };
        if !was_empty {
            self.raise(ListEvent::Cleared);
        }
    }

    /// Replace the whole content; observers see a single Reset.
    pub fn reset(&self, values: Vec<Value>) {
        *self.items.borrow_mut() = values;
        self.raise(ListEvent::Reset);
    }

    fn raise(&self, event: ListEvent) {
        let snapshot: Vec<ListEventFn> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in snapshot {
            callback(&event);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
