// ============================================================================
// pathbind - Binding Orchestrator
//
// Owns the full life of one binding: classify the path pair, evaluate the
// source side, push the value (or the collection diff) into the target side,
// and re-run whenever a subscribed dependency changes.
//
// Loop safety rests on three mechanisms:
// - a propagation guard: change notifications raised while this binding is
//   writing are its own echo and are dropped;
// - the last synchronized value: a value equal to the last one pushed is
//   not pushed again;
// - scratch containers: starting an evaluation for a side disposes that
//   side's in-flight evaluations, so a stale suspended evaluation can never
//   deliver an outdated value over a newer one.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::dispose::{Dispose, DisposableContainer, DisposeHandle};
use crate::core::error::{BindError, Fault, FaultReport};
use crate::core::events::ObservableList;
use crate::core::services::{BindingServices, Schedule};
use crate::core::value::{DataObject, Value};
use crate::diff::{CollectionChange, DiffPipeline};
use crate::path::{
    AccessPath, Accessor, Dependency, EvalCallback, Evaluation, Outcome, ScheduledAccessor,
};

use super::classify::{classify, Classification, SideIndex};

// =============================================================================
// SIDE STATE
// =============================================================================

struct SideState {
    path: AccessPath,
    accessor: Accessor,
    /// Defers this side's read and write steps when set.
    scheduler: RefCell<Option<Rc<dyn Schedule>>>,
    /// Dependency subscription tokens, replaced wholesale after each
    /// evaluation of this side.
    subscriptions: DisposableContainer,
    /// In-flight evaluation handles; cleared to cancel stale evaluations.
    scratch: DisposableContainer,
}

impl SideState {
    fn new(path: AccessPath) -> Self {
        Self {
            accessor: Accessor::new(path.clone()),
            path,
            scheduler: RefCell::new(None),
            subscriptions: DisposableContainer::new(),
            scratch: DisposableContainer::new(),
        }
    }

    fn read(
        &self,
        source: &Value,
        on_suspend: impl Fn(&[Dependency]) + 'static,
        on_done: EvalCallback,
    ) -> DisposeHandle {
        self.read_via(&self.accessor, source, on_suspend, on_done)
    }

    /// Read through `accessor`, deferred onto the side's scheduler when one
    /// is configured.
    fn read_via(
        &self,
        accessor: &Accessor,
        source: &Value,
        on_suspend: impl Fn(&[Dependency]) + 'static,
        on_done: EvalCallback,
    ) -> DisposeHandle {
        match self.scheduler.borrow().clone() {
            Some(scheduler) => ScheduledAccessor::from_accessor(accessor.clone(), scheduler)
                .read_with(source, on_suspend, on_done),
            None => accessor.read_with(source, on_suspend, on_done),
        }
    }
}

// =============================================================================
// BINDING
// =============================================================================

struct BindingInner {
    id: u64,
    services: Rc<BindingServices>,
    source: RefCell<Value>,
    sides: [SideState; 2],
    classification: Cell<Option<Classification>>,
    /// Last value pushed into a target; pushing an equal value is skipped.
    last_value: RefCell<Option<Value>>,
    /// True while this binding is writing; notifications arriving then are
    /// the binding's own echo.
    propagating: Cell<bool>,
    bound: Cell<bool>,
    disposed: Cell<bool>,
    // Collection mode state
    pipeline: RefCell<Option<DiffPipeline>>,
    source_list: RefCell<Option<Rc<ObservableList>>>,
    target_list: RefCell<Option<Rc<ObservableList>>>,
    /// Terminal (object, member) of a target path that did not resolve to a
    /// physical list; changes invalidate this member instead of mutating.
    target_invalidate: RefCell<Option<(Rc<dyn DataObject>, String)>>,
    list_subscription: RefCell<Option<DisposeHandle>>,
    self_weak: Weak<BindingInner>,
}

/// A live two-path binding. Cloning shares the same binding.
#[derive(Clone)]
pub struct Binding {
    inner: Rc<BindingInner>,
}

impl Binding {
    /// Create an unbound binding over `source`. Nothing is evaluated or
    /// subscribed until `bind` runs.
    pub fn new(
        services: Rc<BindingServices>,
        source: Value,
        left: AccessPath,
        right: AccessPath,
    ) -> Self {
        let id = services.allocate_binding_id();
        let inner = Rc::new_cyclic(|weak| BindingInner {
            id,
            services,
            source: RefCell::new(source),
            sides: [SideState::new(left), SideState::new(right)],
            classification: Cell::new(None),
            last_value: RefCell::new(None),
            propagating: Cell::new(false),
            bound: Cell::new(false),
            disposed: Cell::new(false),
            pipeline: RefCell::new(None),
            source_list: RefCell::new(None),
            target_list: RefCell::new(None),
            target_invalidate: RefCell::new(None),
            list_subscription: RefCell::new(None),
            self_weak: weak.clone(),
        });
        Self { inner }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_bound(&self) -> bool {
        self.inner.bound.get()
    }

    /// Classify the path pair, run the initial synchronization and subscribe
    /// to every dependency it touches. Binding an already-bound binding is a
    /// no-op.
    pub fn bind(&self) -> Result<(), BindError> {
        self.inner.bind()
    }

    /// Release every subscription and forget synchronization state. The
    /// binding may be bound again later.
    pub fn unbind(&self) {
        self.inner.unbind();
    }

    /// Swap the root source value; a bound binding re-synchronizes from
    /// scratch against the new source.
    pub fn set_source(&self, source: Value) {
        self.inner.set_source(source);
    }

    /// Defer one side's read and write steps onto `scheduler`. The other
    /// side keeps evaluating synchronously.
    pub fn with_scheduler(self, side: SideIndex, scheduler: Rc<dyn Schedule>) -> Self {
        *self.inner.side(side).scheduler.borrow_mut() = Some(scheduler);
        self
    }
}

impl Dispose for Binding {
    fn dispose(&self) {
        self.inner.dispose();
    }
}

// =============================================================================
// ORCHESTRATION
// =============================================================================

impl BindingInner {
    fn side(&self, index: SideIndex) -> &SideState {
        &self.sides[index as usize]
    }

    fn bind(self: &Rc<Self>) -> Result<(), BindError> {
        if self.disposed.get() {
            panic!("binding #{} bound after dispose", self.id);
        }
        if self.bound.get() {
            return Ok(());
        }

        let classification = classify(&self.side(SideIndex::Left).path, &self.side(SideIndex::Right).path)?;
        self.classification.set(Some(classification));
        self.bound.set(true);

        tracing::debug!(
            id = self.id,
            left = self.side(SideIndex::Left).path.display(),
            right = self.side(SideIndex::Right).path.display(),
            source = classification.source.name(),
            two_way = classification.two_way,
            collection = classification.collection,
            "binding bound"
        );

        if classification.collection {
            self.sync_collection();
        } else {
            self.evaluate_side(classification.source);
        }
        Ok(())
    }

    fn unbind(&self) {
        if !self.bound.get() {
            return;
        }
        self.bound.set(false);
        self.classification.set(None);
        for side in &self.sides {
            side.scratch.clear();
            side.subscriptions.clear();
        }
        if let Some(token) = self.list_subscription.borrow_mut().take() {
            token.dispose();
        }
        *self.pipeline.borrow_mut() = None;
        *self.source_list.borrow_mut() = None;
        *self.target_list.borrow_mut() = None;
        *self.target_invalidate.borrow_mut() = None;
        *self.last_value.borrow_mut() = None;
        tracing::debug!(id = self.id, "binding unbound");
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.unbind();
    }

    fn set_source(self: &Rc<Self>, source: Value) {
        *self.source.borrow_mut() = source;
        if !self.bound.get() {
            return;
        }
        *self.last_value.borrow_mut() = None;
        let Some(classification) = self.classification.get() else {
            return;
        };
        if classification.collection {
            self.sync_collection();
        } else {
            self.evaluate_side(classification.source);
        }
    }

    fn report(&self, fault: Fault) {
        tracing::error!(id = self.id, %fault, "binding fault");
        self.services.sink().catch(FaultReport {
            binding_id: self.id,
            fault,
        });
    }

    // -------------------------------------------------------------------------
    // SCALAR FLOW
    // -------------------------------------------------------------------------

    /// Cancel the side's in-flight evaluations and start a fresh one.
    fn evaluate_side(self: &Rc<Self>, side: SideIndex) {
        let state = self.side(side);
        state.scratch.clear();

        let weak = self.self_weak.clone();
        let suspend_weak = self.self_weak.clone();
        let source = self.source.borrow().clone();
        // The suspend hook keeps the side re-triggerable while the
        // evaluation is parked on a pending value.
        let handle = state.read(
            &source,
            move |deps| {
                if let Some(inner) = suspend_weak.upgrade() {
                    inner.resubscribe(side, deps);
                }
            },
            Box::new(move |eval| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_evaluated(side, eval);
                }
            }),
        );
        state.scratch.add(handle);
    }

    fn on_evaluated(self: &Rc<Self>, side: SideIndex, eval: Evaluation) {
        if self.disposed.get() || !self.bound.get() {
            return;
        }
        self.resubscribe(side, &eval.deps);
        match eval.outcome {
            Outcome::Success(value) => self.propagate(side, value),
            Outcome::Failure => {
                // Dependencies stay subscribed; the sync resumes once the
                // missing intermediate appears.
                tracing::trace!(id = self.id, side = side.name(), "evaluation incomplete");
            }
            Outcome::Fault(fault) => self.report(fault),
        }
    }

    /// Push `value` into the side opposite `from`, unless it equals the last
    /// synchronized value.
    fn propagate(self: &Rc<Self>, from: SideIndex, value: Value) {
        let suppressed = self.last_value.borrow().as_ref() == Some(&value);
        if suppressed {
            tracing::trace!(id = self.id, "propagation suppressed, value unchanged");
            return;
        }
        *self.last_value.borrow_mut() = Some(value.clone());

        let target = from.other();
        let state = self.side(target);
        state.scratch.clear();

        // A scheduled target defers the whole write step, so the propagation
        // guard wraps the write when it actually runs, not when it is queued.
        let scheduler = state.scheduler.borrow().clone();
        if let Some(scheduler) = scheduler {
            let weak = self.self_weak.clone();
            let registration = scheduler.schedule(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.write_target(target, value);
                }
            }));
            state.scratch.add(registration);
            return;
        }
        self.write_target(target, value);
    }

    fn write_target(self: &Rc<Self>, target: SideIndex, value: Value) {
        if self.disposed.get() || !self.bound.get() {
            return;
        }
        let state = self.side(target);
        state.scratch.clear();

        let weak = self.self_weak.clone();
        let suspend_weak = self.self_weak.clone();
        let source = self.source.borrow().clone();
        self.propagating.set(true);
        let handle = state.accessor.write_with(
            &source,
            value,
            move |deps| {
                if let Some(inner) = suspend_weak.upgrade() {
                    inner.resubscribe(target, deps);
                }
            },
            Box::new(move |eval| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_written(target, eval);
                }
            }),
        );
        state.scratch.add(handle);
        self.propagating.set(false);
    }

    fn on_written(self: &Rc<Self>, side: SideIndex, eval: Evaluation) {
        if self.disposed.get() || !self.bound.get() {
            return;
        }
        // The target's dependencies include its terminal member, so an
        // external overwrite of the target re-triggers the binding.
        self.resubscribe(side, &eval.deps);
        match eval.outcome {
            Outcome::Success(_) => {
                tracing::trace!(id = self.id, side = side.name(), "synchronized");
            }
            Outcome::Failure => {
                // The value never landed; do not let it suppress the retry
                // once the target chain completes.
                *self.last_value.borrow_mut() = None;
                tracing::trace!(id = self.id, side = side.name(), "target chain incomplete");
            }
            Outcome::Fault(fault) => {
                *self.last_value.borrow_mut() = None;
                self.report(fault);
            }
        }
    }

    // -------------------------------------------------------------------------
    // DEPENDENCY ROUTING
    // -------------------------------------------------------------------------

    /// Replace the side's subscriptions with one per dependency just traced.
    fn resubscribe(&self, side: SideIndex, deps: &[Dependency]) {
        let state = self.side(side);
        state.subscriptions.clear();
        for dep in deps {
            let token = match dep {
                Dependency::Member { target, member } => {
                    let weak = self.self_weak.clone();
                    self.services.members().subscribe(
                        target,
                        member,
                        Rc::new(move || {
                            if let Some(inner) = weak.upgrade() {
                                inner.on_side_changed(side);
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
                                inner.on_side_changed(side);
                            }
                        }),
                    )
                }
            };
            state.subscriptions.add(token);
        }
    }

    fn on_side_changed(self: &Rc<Self>, changed: SideIndex) {
        if self.disposed.get() || !self.bound.get() || self.propagating.get() {
            return;
        }
        let Some(classification) = self.classification.get() else {
            return;
        };
        tracing::trace!(id = self.id, side = changed.name(), "dependency changed");

        if classification.collection {
            // A member along either chain changed; both lists may have been
            // swapped out, so re-resolve from scratch.
            self.sync_collection();
        } else if classification.two_way {
            self.evaluate_side(changed);
        } else {
            if changed != classification.source {
                // External overwrite of the one-way target: forget the last
                // synchronized value so the restore is not suppressed.
                *self.last_value.borrow_mut() = None;
            }
            self.evaluate_side(classification.source);
        }
    }

    // -------------------------------------------------------------------------
    // COLLECTION FLOW
    // -------------------------------------------------------------------------

    /// Re-resolve both lists, rebuild the pipeline and mirror the full query
    /// output into the target list.
    fn sync_collection(self: &Rc<Self>) {
        let Some(classification) = self.classification.get() else {
            return;
        };
        let target_side = classification.source.other();

        if let Some(token) = self.list_subscription.borrow_mut().take() {
            token.dispose();
        }
        *self.source_list.borrow_mut() = None;
        *self.target_list.borrow_mut() = None;
        *self.target_invalidate.borrow_mut() = None;

        // Resolve the target list first; the source resolution completes the
        // chain from its callback.
        let state = self.side(target_side);
        state.scratch.clear();
        let weak = self.self_weak.clone();
        let suspend_weak = self.self_weak.clone();
        let source = self.source.borrow().clone();
        let handle = state.read(
            &source,
            move |deps| {
                if let Some(inner) = suspend_weak.upgrade() {
                    inner.resubscribe(target_side, deps);
                }
            },
            Box::new(move |eval| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_collection_target(target_side, eval);
                }
            }),
        );
        state.scratch.add(handle);
    }

    fn on_collection_target(self: &Rc<Self>, side: SideIndex, eval: Evaluation) {
        if self.disposed.get() || !self.bound.get() {
            return;
        }
        self.resubscribe(side, &eval.deps);
        match eval.outcome {
            // Only a plain member chain resolving to a real list receives
            // physical mutations; a queried path materializes a throwaway
            // snapshot on every read.
            Outcome::Success(Value::List(list))
                if self.side(side).path.is_plain_member_chain() =>
            {
                *self.target_list.borrow_mut() = Some(list);
                self.resolve_collection_source();
            }
            // The target is a path, not a physical list: changes invalidate
            // its terminal member so observers re-read the query output
            // instead of receiving diffs.
            Outcome::Success(_) => {
                let terminal = eval.deps.iter().rev().find_map(|dep| match dep {
                    Dependency::Member { target, member } => {
                        Some((target.clone(), member.clone()))
                    }
                    Dependency::Collection(_) => None,
                });
                match terminal {
                    Some(pair) => {
                        *self.target_invalidate.borrow_mut() = Some(pair);
                        self.resolve_collection_source();
                    }
                    None => self.report(Fault::at(
                        "collection target has no member to invalidate",
                        self.side(side).path.display(),
                    )),
                }
            }
            Outcome::Failure => {
                tracing::trace!(id = self.id, "collection target incomplete");
            }
            Outcome::Fault(fault) => self.report(fault),
        }
    }

    fn resolve_collection_source(self: &Rc<Self>) {
        let Some(classification) = self.classification.get() else {
            return;
        };
        let source_side = classification.source;
        let state = self.side(source_side);
        state.scratch.clear();

        let (base, queries) = state.path.collection_split();
        *self.pipeline.borrow_mut() = Some(DiffPipeline::new(queries));

        let weak = self.self_weak.clone();
        let suspend_weak = self.self_weak.clone();
        let source = self.source.borrow().clone();
        let handle = state.read_via(
            &Accessor::new(base),
            &source,
            move |deps| {
                if let Some(inner) = suspend_weak.upgrade() {
                    inner.resubscribe(source_side, deps);
                }
            },
            Box::new(move |eval| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_collection_source(source_side, eval);
                }
            }),
        );
        state.scratch.add(handle);
    }

    fn on_collection_source(self: &Rc<Self>, side: SideIndex, eval: Evaluation) {
        if self.disposed.get() || !self.bound.get() {
            return;
        }
        self.resubscribe(side, &eval.deps);
        match eval.outcome {
            Outcome::Success(Value::List(list)) => {
                *self.source_list.borrow_mut() = Some(list.clone());
                self.rebuild_target();

                let weak = self.self_weak.clone();
                let token = self.services.collections().subscribe(
                    &list,
                    Rc::new(move |change| {
                        if let Some(inner) = weak.upgrade() {
                            inner.on_source_collection_change(change);
                        }
                    }),
                );
                *self.list_subscription.borrow_mut() = Some(token);
            }
            Outcome::Success(other) => self.report(Fault::at(
                format!("collection source resolved to {}", other.type_name()),
                self.side(side).path.display(),
            )),
            Outcome::Failure => {
                tracing::trace!(id = self.id, "collection source incomplete");
            }
            Outcome::Fault(fault) => self.report(fault),
        }
    }

    /// Enumerate the pipeline from the source snapshot and mirror its output
    /// into the target wholesale.
    fn rebuild_target(&self) {
        let snapshot = match &*self.source_list.borrow() {
            Some(list) => list.snapshot(),
            None => return,
        };
        let view = {
            let pipeline = self.pipeline.borrow();
            let Some(pipeline) = &*pipeline else {
                return;
            };
            pipeline.enumerate(&snapshot);
            pipeline.final_view()
        };
        if let Some(target) = &*self.target_list.borrow() {
            target.reset(view);
        } else {
            self.invalidate_target_path();
        }
        tracing::debug!(id = self.id, "collection target rebuilt");
    }

    /// Path-mode terminal consumer: fire the target member's callbacks so
    /// observers re-read the query output.
    fn invalidate_target_path(&self) {
        let terminal = self.target_invalidate.borrow().clone();
        if let Some((object, member)) = terminal {
            let members = self.services.members();
            let change = members.allocate_change_id();
            self.propagating.set(true);
            members.invalidate(&object, &member, change);
            self.propagating.set(false);
            tracing::trace!(id = self.id, member = %member, change, "target path invalidated");
        }
    }

    fn on_source_collection_change(self: &Rc<Self>, change: &CollectionChange<Value>) {
        if self.disposed.get() || !self.bound.get() {
            return;
        }
        let outputs = {
            let pipeline = self.pipeline.borrow();
            let Some(pipeline) = &*pipeline else {
                return;
            };
            pipeline.process(change)
        };
        let target = match &*self.target_list.borrow() {
            Some(target) => target.clone(),
            None => {
                // Path-mode target: one invalidation stands in for the whole
                // batch; Invalidate still re-enumerates the pipeline.
                if outputs
                    .iter()
                    .any(|output| matches!(output, CollectionChange::Invalidate))
                {
                    self.rebuild_target();
                } else if !outputs.is_empty() {
                    self.invalidate_target_path();
                }
                return;
            }
        };
        for output in outputs {
            match output {
                CollectionChange::Insert { index, items } => target.insert_all(index, items),
                CollectionChange::Remove { index, items } => {
                    for _ in 0..items.len() {
                        target.remove_at(index);
                    }
                }
                CollectionChange::Replace { index, new, .. } => {
                    target.replace(index, new);
                }
                CollectionChange::Move { from, to } => {
                    target.move_item(from, to);
                }
                CollectionChange::Clear => target.clear(),
                CollectionChange::Invalidate => self.rebuild_target(),
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::CollectingSink;
    use crate::core::services::ManualScheduler;
    use crate::core::value::Record;
    use crate::path::PathBuilder;

    fn services_with_sink() -> (Rc<BindingServices>, Rc<CollectingSink>) {
        let sink = Rc::new(CollectingSink::new());
        (BindingServices::with_sink(sink.clone()), sink)
    }

    fn member(name: &str) -> AccessPath {
        PathBuilder::new().member(name).build()
    }

    #[test]
    fn two_way_syncs_right_to_left_then_both_ways() {
        let (services, _sink) = services_with_sink();
        let root = Record::with([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let binding = Binding::new(
            services,
            Value::object(root.clone()),
            member("a"),
            member("b"),
        );
        binding.bind().unwrap();

        // Initial sync seeds from the right
        assert_eq!(root.get("a"), Some(Value::Int(2)));

        root.set("a", Value::Int(7));
        assert_eq!(root.get("b"), Some(Value::Int(7)));

        root.set("b", Value::Int(9));
        assert_eq!(root.get("a"), Some(Value::Int(9)));
    }

    #[test]
    fn one_way_restores_an_overwritten_target() {
        let (services, _sink) = services_with_sink();
        let root = Record::with([("view", Value::Int(0)), ("model", Value::Int(5))]);
        let binding = Binding::new(
            services,
            Value::object(root.clone()),
            member("view"),
            PathBuilder::new().readonly_member("model").build(),
        );
        binding.bind().unwrap();
        assert_eq!(root.get("view"), Some(Value::Int(5)));

        // An external overwrite of the one-way target is undone
        root.set("view", Value::Int(99));
        assert_eq!(root.get("view"), Some(Value::Int(5)));
    }

    #[test]
    fn unbind_releases_every_subscription() {
        let (services, _sink) = services_with_sink();
        let root = Record::with([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let binding = Binding::new(
            services.clone(),
            Value::object(root.clone()),
            member("a"),
            member("b"),
        );
        binding.bind().unwrap();
        assert!(services.members().entry_count() > 0);

        binding.unbind();
        assert_eq!(services.members().entry_count(), 0);

        root.set("b", Value::Int(42));
        assert_eq!(root.get("a"), Some(Value::Int(2)));
    }

    #[test]
    fn rebinding_after_unbind_resumes_sync() {
        let (services, _sink) = services_with_sink();
        let root = Record::with([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let binding = Binding::new(
            services,
            Value::object(root.clone()),
            member("a"),
            member("b"),
        );
        binding.bind().unwrap();
        binding.unbind();

        root.set("b", Value::Int(10));
        binding.bind().unwrap();
        assert_eq!(root.get("a"), Some(Value::Int(10)));
    }

    #[test]
    fn faults_reach_the_sink_and_keep_the_binding_alive() {
        let (services, sink) = services_with_sink();
        let root = Record::with([("a", Value::Int(1))]);
        // Reading "missing" on the right faults
        let binding = Binding::new(
            services,
            Value::object(root.clone()),
            member("a"),
            PathBuilder::new()
                .member("holder")
                .member("value")
                .build(),
        );
        binding.bind().unwrap();
        // "holder" is unknown on the root record
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.take()[0].binding_id, binding.id());
    }

    #[test]
    fn intermediate_null_resumes_when_the_chain_completes() {
        let (services, sink) = services_with_sink();
        let root = Record::with([("a", Value::Int(0)), ("holder", Value::Null)]);
        let binding = Binding::new(
            services,
            Value::object(root.clone()),
            member("a"),
            PathBuilder::new().member("holder").member("value").build(),
        );
        binding.bind().unwrap();
        assert!(sink.is_empty());
        assert_eq!(root.get("a"), Some(Value::Int(0)));

        // Completing the chain re-triggers the sync
        let holder = Record::with([("value", Value::Int(3))]);
        root.set("holder", Value::object(holder));
        assert_eq!(root.get("a"), Some(Value::Int(3)));
    }

    #[test]
    fn set_source_resynchronizes() {
        let (services, _sink) = services_with_sink();
        let first = Record::with([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let second = Record::with([("a", Value::Int(0)), ("b", Value::Int(8))]);
        let binding = Binding::new(
            services,
            Value::object(first.clone()),
            member("a"),
            member("b"),
        );
        binding.bind().unwrap();
        assert_eq!(first.get("a"), Some(Value::Int(2)));

        binding.set_source(Value::object(second.clone()));
        assert_eq!(second.get("a"), Some(Value::Int(8)));

        // The old source is fully detached
        first.set("b", Value::Int(77));
        assert_eq!(first.get("a"), Some(Value::Int(2)));
    }

    #[test]
    fn dispose_is_idempotent_and_final() {
        let (services, _sink) = services_with_sink();
        let root = Record::with([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let binding = Binding::new(
            services.clone(),
            Value::object(root),
            member("a"),
            member("b"),
        );
        binding.bind().unwrap();
        binding.dispose();
        binding.dispose();
        assert_eq!(services.members().entry_count(), 0);
        assert!(!binding.is_bound());
    }

    #[test]
    #[should_panic(expected = "after dispose")]
    fn binding_after_dispose_panics() {
        let (services, _sink) = services_with_sink();
        let root = Record::new();
        let binding = Binding::new(
            services,
            Value::object(root),
            member("a"),
            member("b"),
        );
        binding.dispose();
        let _ = binding.bind();
    }

    fn list_pair(
        source_values: Vec<Value>,
    ) -> (Rc<ObservableList>, Rc<ObservableList>, Rc<Record>, Binding) {
        let (services, _sink) = services_with_sink();
        let source = ObservableList::from_values(source_values);
        let mirror = ObservableList::new();
        let root = Record::with([
            ("items", Value::list(source.clone())),
            ("mirror", Value::list(mirror.clone())),
        ]);
        let items = PathBuilder::new()
            .readonly_member("items")
            .collection()
            .build();
        let plain = PathBuilder::new()
            .readonly_member("mirror")
            .collection()
            .build();
        let binding = Binding::new(services, Value::object(root.clone()), items, plain);
        (source, mirror, root, binding)
    }

    #[test]
    fn collection_changes_replay_into_the_target() {
        let (source, mirror, _root, binding) =
            list_pair(vec![Value::Int(1), Value::Int(2)]);
        binding.bind().unwrap();
        assert_eq!(mirror.snapshot(), vec![Value::Int(1), Value::Int(2)]);

        source.push(Value::Int(9));
        source.replace(0, Value::Int(5));
        source.move_item(0, 2);
        assert_eq!(
            mirror.snapshot(),
            vec![Value::Int(2), Value::Int(9), Value::Int(5)]
        );

        source.remove_at(1);
        assert_eq!(mirror.snapshot(), vec![Value::Int(2), Value::Int(5)]);
    }

    #[test]
    fn collection_reset_rebuilds_the_target() {
        let (source, mirror, _root, binding) = list_pair(vec![Value::Int(3)]);
        binding.bind().unwrap();

        source.reset(vec![Value::Int(1), Value::Int(7), Value::Int(8)]);
        assert_eq!(
            mirror.snapshot(),
            vec![Value::Int(1), Value::Int(7), Value::Int(8)]
        );
    }

    #[test]
    fn swapping_the_source_list_member_resyncs() {
        let (first, mirror, root, binding) = list_pair(vec![Value::Int(3)]);
        let second = ObservableList::from_values(vec![Value::Int(30), Value::Int(1)]);
        binding.bind().unwrap();
        assert_eq!(mirror.snapshot(), vec![Value::Int(3)]);

        root.set("items", Value::list(second.clone()));
        assert_eq!(mirror.snapshot(), vec![Value::Int(30), Value::Int(1)]);

        // The first list is no longer watched
        first.push(Value::Int(100));
        assert_eq!(mirror.snapshot(), vec![Value::Int(30), Value::Int(1)]);

        second.push(Value::Int(40));
        assert_eq!(
            mirror.snapshot(),
            vec![Value::Int(30), Value::Int(1), Value::Int(40)]
        );
    }

    #[test]
    fn plain_member_target_is_invalidated_instead_of_mutated() {
        let (services, _sink) = services_with_sink();
        let source = ObservableList::from_values(vec![Value::Int(1), Value::Int(2)]);
        let root = Record::with([
            ("items", Value::list(source.clone())),
            ("view", Value::Null),
        ]);

        let queried = PathBuilder::new()
            .readonly_member("items")
            .filter(|v| v.as_int().is_some_and(|n| n > 1))
            .collection()
            .build();
        let view = PathBuilder::new().readonly_member("view").build();

        let binding = Binding::new(
            services.clone(),
            Value::object(root.clone()),
            queried,
            view,
        );
        binding.bind().unwrap();

        let hits = Rc::new(Cell::new(0u32));
        let seen = hits.clone();
        let target: Rc<dyn DataObject> = root;
        let _token = services.members().subscribe(
            &target,
            "view",
            Rc::new(move || seen.set(seen.get() + 1)),
        );

        source.push(Value::Int(5));
        assert_eq!(hits.get(), 1);

        // A change the query filters out never reaches the target member.
        source.push(Value::Int(0));
        assert_eq!(hits.get(), 1);

        binding.dispose();
    }

    #[test]
    fn scheduled_target_defers_the_write_step() {
        let (services, _sink) = services_with_sink();
        let scheduler = ManualScheduler::new();
        let root = Record::with([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let binding = Binding::new(
            services,
            Value::object(root.clone()),
            member("a"),
            member("b"),
        )
        .with_scheduler(SideIndex::Left, scheduler.clone());
        binding.bind().unwrap();

        // The right side read ran synchronously; the write into `a` waits
        assert_eq!(root.get("a"), Some(Value::Int(1)));
        assert_eq!(scheduler.pending(), 1);
        scheduler.run_all();
        assert_eq!(root.get("a"), Some(Value::Int(2)));

        // A superseding value cancels the queued write; the last one lands
        root.set("b", Value::Int(7));
        root.set("b", Value::Int(8));
        assert_eq!(root.get("a"), Some(Value::Int(2)));
        scheduler.run_all();
        assert_eq!(root.get("a"), Some(Value::Int(8)));
    }

    #[test]
    fn scheduled_source_defers_evaluation_and_dispose_cancels() {
        let (services, _sink) = services_with_sink();
        let scheduler = ManualScheduler::new();
        let root = Record::with([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let binding = Binding::new(
            services,
            Value::object(root.clone()),
            member("a"),
            member("b"),
        )
        .with_scheduler(SideIndex::Right, scheduler.clone());
        binding.bind().unwrap();

        // Nothing synchronizes until the queue is pumped
        assert_eq!(root.get("a"), Some(Value::Int(1)));
        scheduler.run_all();
        assert_eq!(root.get("a"), Some(Value::Int(2)));

        root.set("b", Value::Int(9));
        binding.dispose();
        scheduler.run_all();
        assert_eq!(root.get("a"), Some(Value::Int(2)));
    }
}
