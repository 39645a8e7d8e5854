// ============================================================================
// pathbind - Value Domain
//
// The dynamic values access paths evaluate over, and the member-access
// contract bound objects implement.
// ============================================================================

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::error::Fault;
use super::events::{EventTable, MemberChangedSignal, ObservableList};
use super::pending::Pending;

// =============================================================================
// VALUE
// =============================================================================

/// A dynamically-typed value flowing through an access path.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Object(Rc<dyn DataObject>),
    List(Rc<ObservableList>),
    /// An asynchronous intermediate result; evaluation suspends on it.
    Pending(Pending<Value>),
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn object(object: Rc<dyn DataObject>) -> Value {
        Value::Object(object)
    }

    pub fn list(list: Rc<ObservableList>) -> Value {
        Value::List(list)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<dyn DataObject>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<ObservableList>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Human-readable type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Object(_) => "object",
            Value::List(_) => "list",
            Value::Pending(_) => "pending",
        }
    }
}

/// Scalars compare by value; objects and lists by identity; pending values
/// never compare equal (their final value is unknown).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Object(o) => write!(f, "object@{:p}", Rc::as_ptr(o)),
            Value::List(l) => write!(f, "list(len={})", l.len()),
            Value::Pending(p) => write!(f, "{p:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}

// =============================================================================
// DATA OBJECT
// =============================================================================

/// Named-member access plus optional change-notification capabilities.
///
/// The two capability probes drive the subscription factory's strategy
/// selection: objects exposing `notify()` use the standard member-changed
/// protocol directly; objects exposing only `events()` get the best-effort
/// convention fallback; objects exposing neither are reachable only via
/// forced invalidation.
pub trait DataObject: Any {
    /// Read a member. None means the member does not exist (a fault when
    /// accessed through a path, as opposed to a Null value, which is a
    /// normal "no value yet").
    fn get_member(&self, member: &str) -> Option<Value>;

    /// Assign a member. Default: members are not settable.
    fn set_member(&self, member: &str, _value: Value) -> Result<(), Fault> {
        Err(Fault::new(format!("member `{member}` is not settable")))
    }

    /// Standard member-changed notification protocol, if implemented.
    fn notify(&self) -> Option<&MemberChangedSignal> {
        None
    }

    /// Named-event table for the convention-based fallback, if implemented.
    fn events(&self) -> Option<&EventTable> {
        None
    }
}

/// Identity key for a data object, used by the subscription registries.
pub fn object_key(object: &Rc<dyn DataObject>) -> usize {
    Rc::as_ptr(object) as *const () as usize
}

// =============================================================================
// RECORD - map-backed DataObject with the standard notify protocol
// =============================================================================

/// A field map implementing `DataObject` with member-changed notification.
pub struct Record {
    fields: RefCell<HashMap<String, Value>>,
    changed: MemberChangedSignal,
}

impl Record {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            fields: RefCell::new(HashMap::new()),
            changed: MemberChangedSignal::new(),
        })
    }

    /// Build a record from (member, value) pairs.
    pub fn with(fields: impl IntoIterator<Item = (&'static str, Value)>) -> Rc<Self> {
        let record = Self::new();
        {
            let mut map = record.fields.borrow_mut();
            for (name, value) in fields {
                map.insert(name.to_string(), value);
            }
        }
        record
    }

    pub fn get(&self, member: &str) -> Option<Value> {
        self.fields.borrow().get(member).cloned()
    }

    /// Set a field, raising member-changed when the value actually changes.
    pub fn set(&self, member: &str, value: Value) {
        let changed = {
            let mut fields = self.fields.borrow_mut();
            match fields.get(member) {
                Some(old) if *old == value => false,
                _ => {
                    fields.insert(member.to_string(), value);
                    true
                }
            }
        };
        if changed {
            self.changed.raise(member);
        }
    }
}

impl DataObject for Record {
    fn get_member(&self, member: &str) -> Option<Value> {
        self.get(member)
    }

    fn set_member(&self, member: &str, value: Value) -> Result<(), Fault> {
        self.set(member, value);
        Ok(())
    }

    fn notify(&self) -> Option<&MemberChangedSignal> {
        Some(&self.changed)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn scalar_equality_by_value() {
        assert_eq!(Value::Int(1), Value::Int(1));
        assert_ne!(Value::Int(1), Value::Int(2));
        assert_eq!(Value::str("a"), Value::str("a"));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Null, Value::Null);
    }

    #[test]
    fn object_equality_by_identity() {
        let a = Record::with([("x", Value::Int(1))]);
        let b = Record::with([("x", Value::Int(1))]);
        let va = Value::object(a.clone());

        assert_eq!(va, Value::object(a));
        assert_ne!(va, Value::object(b));
    }

    #[test]
    fn pending_never_equal() {
        let p: Pending<Value> = Pending::resolved(Value::Int(1));
        assert_ne!(Value::Pending(p.clone()), Value::Pending(p));
    }

    #[test]
    fn record_get_set_round_trip() {
        let record = Record::new();
        assert_eq!(record.get("name"), None);

        record.set("name", Value::str("ada"));
        assert_eq!(record.get("name"), Some(Value::str("ada")));
    }

    #[test]
    fn record_raises_member_changed_only_on_change() {
        let record = Record::with([("count", Value::Int(0))]);
        let raised = Rc::new(Cell::new(0));
        let raised_clone = raised.clone();

        let _sub = record
            .notify()
            .unwrap()
            .subscribe(Rc::new(move |member: &str| {
                assert_eq!(member, "count");
                raised_clone.set(raised_clone.get() + 1);
            }));

        record.set("count", Value::Int(0)); // unchanged
        assert_eq!(raised.get(), 0);

        record.set("count", Value::Int(1));
        assert_eq!(raised.get(), 1);
    }

    #[test]
    fn default_set_member_is_a_fault() {
        struct ReadOnly;
        impl DataObject for ReadOnly {
            fn get_member(&self, _member: &str) -> Option<Value> {
                Some(Value::Int(1))
            }
        }

        let object = ReadOnly;
        let err = object.set_member("x", Value::Int(2)).unwrap_err();
        assert!(err.message().contains("not settable"));
    }
}
