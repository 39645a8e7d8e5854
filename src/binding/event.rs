// ============================================================================
// pathbind - Event Binding
//
// Couples a binding to a declared event: each time the event fires, the
// binding re-synchronizes with the event payload swapped in as its source.
// The event source is located by evaluating an access path, and the handler
// re-attaches whenever that path's dependencies change, so a swapped-out
// source keeps driving the binding. The usual use is binding against
// transient data that only exists inside an event, e.g. the item a
// notification carries.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::dispose::{Dispose, DisposableContainer, DisposeHandle};
use crate::core::error::{BindError, Fault, FaultReport};
use crate::core::services::BindingServices;
use crate::core::value::{DataObject, Value};
use crate::path::{AccessPath, Accessor, Dependency, Evaluation, Outcome};

use super::engine::Binding;

struct EventInner {
    services: Rc<BindingServices>,
    source: Value,
    accessor: Accessor,
    event: String,
    binding: Binding,
    /// Dependency subscription tokens for the event path.
    subscriptions: DisposableContainer,
    /// In-flight path evaluations; cleared to cancel stale ones.
    scratch: DisposableContainer,
    /// The current native event handler, replaced on every re-resolution.
    attachment: RefCell<Option<DisposeHandle>>,
    /// While true, attach failures surface as the `attach` return value
    /// instead of going to the sink.
    attaching: Cell<bool>,
    attach_error: RefCell<Option<BindError>>,
    disposed: Cell<bool>,
    self_weak: Weak<EventInner>,
}

/// A binding driven by an event instead of by change subscriptions on its
/// source. Until the first raise, the binding stays unbound.
pub struct EventBinding {
    inner: Rc<EventInner>,
}

impl EventBinding {
    /// Attach the inner `binding` to `event` on whatever object `path`
    /// resolves to against `source`. Fails when the path resolves to an
    /// object that does not declare the event; an unresolved path attaches
    /// later, once its dependencies complete.
    pub fn attach(
        services: Rc<BindingServices>,
        source: Value,
        path: AccessPath,
        event: &str,
        binding: Binding,
    ) -> Result<Self, BindError> {
        let inner = Rc::new_cyclic(|weak| EventInner {
            services,
            source,
            accessor: Accessor::new(path),
            event: event.to_string(),
            binding,
            subscriptions: DisposableContainer::new(),
            scratch: DisposableContainer::new(),
            attachment: RefCell::new(None),
            attaching: Cell::new(true),
            attach_error: RefCell::new(None),
            disposed: Cell::new(false),
            self_weak: weak.clone(),
        });
        inner.resolve();
        inner.attaching.set(false);
        if let Some(error) = inner.attach_error.borrow_mut().take() {
            inner.dispose();
            return Err(error);
        }
        tracing::debug!(id = inner.binding.id(), event, "event binding attached");
        Ok(Self { inner })
    }

    pub fn binding(&self) -> &Binding {
        &self.inner.binding
    }
}

impl Dispose for EventBinding {
    fn dispose(&self) {
        self.inner.dispose();
    }
}

impl EventInner {
    /// Re-evaluate the event path and move the handler to whatever it
    /// resolves to now.
    fn resolve(self: &Rc<Self>) {
        self.scratch.clear();
        let weak = self.self_weak.clone();
        let suspend_weak = self.self_weak.clone();
        let handle = self.accessor.read_with(
            &self.source,
            move |deps| {
                if let Some(inner) = suspend_weak.upgrade() {
                    inner.resubscribe(deps);
                }
            },
            Box::new(move |eval| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_resolved(eval);
                }
            }),
        );
        self.scratch.add(handle);
    }

    fn on_resolved(self: &Rc<Self>, eval: Evaluation) {
        if self.disposed.get() {
            return;
        }
        self.resubscribe(&eval.deps);
        if let Some(previous) = self.attachment.borrow_mut().take() {
            previous.dispose();
        }
        match eval.outcome {
            Outcome::Success(Value::Object(object)) => match self.attach_to(&object) {
                Ok(handle) => {
                    *self.attachment.borrow_mut() = Some(handle);
                    tracing::trace!(id = self.binding.id(), event = %self.event, "handler attached");
                }
                Err(error) => self.fail(error),
            },
            Outcome::Success(other) => self.report(Fault::at(
                format!("event source resolved to {}", other.type_name()),
                self.accessor.path().display(),
            )),
            Outcome::Failure => {
                // No source yet; the dependency subscriptions retry later
                tracing::trace!(id = self.binding.id(), "event source incomplete");
            }
            Outcome::Fault(fault) => self.report(fault),
        }
    }

    fn attach_to(&self, object: &Rc<dyn DataObject>) -> Result<DisposeHandle, BindError> {
        let unknown = || BindError::UnknownEvent {
            event: self.event.clone(),
        };
        let events = object.events().ok_or_else(unknown)?;
        let driven = self.binding.clone();
        events
            .subscribe(
                &self.event,
                Rc::new(move |payload: &Value| {
                    driven.unbind();
                    driven.set_source(payload.clone());
                    if let Err(error) = driven.bind() {
                        tracing::error!(id = driven.id(), %error, "event binding cannot bind");
                    }
                }),
            )
            .ok_or_else(unknown)
    }

    fn resubscribe(&self, deps: &[Dependency]) {
        self.subscriptions.clear();
        for dep in deps {
            let token = match dep {
                Dependency::Member { target, member } => {
                    let weak = self.self_weak.clone();
                    self.services.members().subscribe(
                        target,
                        member,
                        Rc::new(move || {
                            if let Some(inner) = weak.upgrade() {
                                inner.on_path_changed();
                            }
                        }),
                    )
                }
                Dependency::Collection(list) => {
                    let weak = self.self_weak.clone();
                    self.services.collections().subscribe(
                        list,
                        Rc::new(move |_change| {
                            if let Some(inner) = weak.upgrade() {
                                inner.on_path_changed();
                            }
                        }),
                    )
                }
            };
            self.subscriptions.add(token);
        }
    }

    fn on_path_changed(self: &Rc<Self>) {
        if self.disposed.get() {
            return;
        }
        self.resolve();
    }

    fn fail(&self, error: BindError) {
        if self.attaching.get() {
            *self.attach_error.borrow_mut() = Some(error);
        } else {
            tracing::error!(id = self.binding.id(), %error, "event binding lost its event");
            self.report(Fault::at(error.to_string(), self.accessor.path().display()));
        }
    }

    fn report(&self, fault: Fault) {
        tracing::error!(id = self.binding.id(), %fault, "event binding fault");
        self.services.sink().catch(FaultReport {
            binding_id: self.binding.id(),
            fault,
        });
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        if let Some(attachment) = self.attachment.borrow_mut().take() {
            attachment.dispose();
        }
        self.subscriptions.clear();
        self.scratch.clear();
        self.binding.dispose();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::EventTable;
    use crate::core::value::Record;
    use crate::path::PathBuilder;

    struct Notifier {
        table: EventTable,
    }

    impl Notifier {
        fn new() -> Rc<Self> {
            let table = EventTable::new();
            table.declare("itemArrived");
            Rc::new(Self { table })
        }
    }

    impl DataObject for Notifier {
        fn get_member(&self, _member: &str) -> Option<Value> {
            None
        }

        fn events(&self) -> Option<&EventTable> {
            Some(&self.table)
        }
    }

    fn seen_name_binding(services: &Rc<BindingServices>) -> Binding {
        Binding::new(
            services.clone(),
            Value::Null,
            PathBuilder::new().member("seen").build(),
            PathBuilder::new().readonly_member("name").build(),
        )
    }

    #[test]
    fn raise_swaps_the_payload_in_as_source() {
        let services = BindingServices::new();
        let notifier = Notifier::new();
        let root = Record::with([("notifier", Value::object(notifier.clone()))]);

        let binding = seen_name_binding(&services);
        let event_binding = EventBinding::attach(
            services,
            Value::object(root),
            PathBuilder::new().readonly_member("notifier").build(),
            "itemArrived",
            binding,
        )
        .unwrap();

        let payload = Record::with([
            ("seen", Value::Bool(false)),
            ("name", Value::str("crate")),
        ]);
        notifier.table.raise("itemArrived", &Value::object(payload.clone()));

        assert_eq!(payload.get("seen"), Some(Value::str("crate")));
        assert!(event_binding.binding().is_bound());
    }

    #[test]
    fn undeclared_event_is_a_bind_error() {
        let services = BindingServices::new();
        let notifier = Notifier::new();
        let root = Record::with([("notifier", Value::object(notifier))]);

        let binding = seen_name_binding(&services);
        assert!(matches!(
            EventBinding::attach(
                services,
                Value::object(root),
                PathBuilder::new().readonly_member("notifier").build(),
                "never",
                binding,
            ),
            Err(BindError::UnknownEvent { .. })
        ));
    }

    #[test]
    fn swapped_out_event_source_reattaches() {
        let services = BindingServices::new();
        let first = Notifier::new();
        let second = Notifier::new();
        let root = Record::with([("notifier", Value::object(first.clone()))]);

        let binding = seen_name_binding(&services);
        let event_binding = EventBinding::attach(
            services,
            Value::object(root.clone()),
            PathBuilder::new().readonly_member("notifier").build(),
            "itemArrived",
            binding,
        )
        .unwrap();

        root.set("notifier", Value::object(second.clone()));

        // The detached source no longer drives the binding
        let stale = Record::with([
            ("seen", Value::Bool(false)),
            ("name", Value::str("stale")),
        ]);
        first.table.raise("itemArrived", &Value::object(stale.clone()));
        assert_eq!(stale.get("seen"), Some(Value::Bool(false)));

        let payload = Record::with([
            ("seen", Value::Bool(false)),
            ("name", Value::str("fresh")),
        ]);
        second.table.raise("itemArrived", &Value::object(payload.clone()));
        assert_eq!(payload.get("seen"), Some(Value::str("fresh")));
        assert!(event_binding.binding().is_bound());
    }

    #[test]
    fn dispose_detaches_from_the_event() {
        let services = BindingServices::new();
        let notifier = Notifier::new();
        let root = Record::with([("notifier", Value::object(notifier.clone()))]);

        let binding = seen_name_binding(&services);
        let event_binding = EventBinding::attach(
            services,
            Value::object(root),
            PathBuilder::new().readonly_member("notifier").build(),
            "itemArrived",
            binding,
        )
        .unwrap();
        event_binding.dispose();

        let payload = Record::with([
            ("seen", Value::Bool(false)),
            ("name", Value::str("crate")),
        ]);
        notifier.table.raise("itemArrived", &Value::object(payload.clone()));
        assert_eq!(payload.get("seen"), Some(Value::Bool(false)));
    }
}
