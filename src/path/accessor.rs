// ============================================================================
// pathbind - Access-Path Evaluator
//
// Evaluates an AccessPath against a source value, or writes through its
// terminal settable member, suspending transparently on pending values.
// ============================================================================
//
// Terminal outcomes are signaled through the callback, never by panicking
// across the suspension boundary:
// - Success(value): the path evaluated fully
// - Failure: a null was met along a nullable segment - a normal
//   "no value yet", not an error
// - Fault: an evaluation step errored
//
// If an intermediate value is pending, the evaluator registers a
// continuation and returns immediately; the callback fires later, once,
// with the final outcome. Suspension chains through nested pendings.
// The returned handle cancels the continuation (best effort).
//
// The callback also receives the dependency trace - every (object, member)
// pair and list touched - which the orchestrator turns into subscriptions.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::core::dispose::{Dispose, DisposeHandle};
use crate::core::error::Fault;
use crate::core::events::ObservableList;
use crate::core::services::Schedule;
use crate::core::value::{DataObject, Value};

use super::{AccessPath, Segment};

// =============================================================================
// OUTCOME AND DEPENDENCIES
// =============================================================================

/// Terminal result of one evaluation.
#[derive(Debug)]
pub enum Outcome {
    Success(Value),
    Failure,
    Fault(Fault),
}

impl Outcome {
    pub fn success(&self) -> Option<&Value> {
        match self {
            Outcome::Success(v) => Some(v),
            _ => None,
        }
    }
}

/// One change-notification source touched during an evaluation.
#[derive(Clone)]
pub enum Dependency {
    Member {
        target: Rc<dyn DataObject>,
        member: String,
    },
    Collection(Rc<ObservableList>),
}

/// What an evaluation produced: the outcome plus the dependency trace.
pub struct Evaluation {
    pub outcome: Outcome,
    pub deps: Vec<Dependency>,
}

pub type EvalCallback = Box<dyn FnOnce(Evaluation)>;

// =============================================================================
// EVALUATION STATE
// =============================================================================

enum Mode {
    Read,
    /// Walk stops before the terminal member; `value` is then assigned.
    Write { value: RefCell<Option<Value>> },
}

struct EvalState {
    path: AccessPath,
    mode: Mode,
    deps: RefCell<Vec<Dependency>>,
    cancelled: Cell<bool>,
    on_done: RefCell<Option<EvalCallback>>,
    /// Fired with the dependencies traced so far whenever the walk suspends,
    /// so the caller can subscribe to them before the outcome exists.
    on_suspend: Option<Box<dyn Fn(&[Dependency])>>,
    /// Continuation registration while suspended on a pending value.
    waiting: RefCell<Option<DisposeHandle>>,
}

fn finish(state: &Rc<EvalState>, outcome: Outcome) {
    if state.cancelled.get() {
        return;
    }
    state.waiting.borrow_mut().take();
    if let Some(on_done) = state.on_done.borrow_mut().take() {
        let deps = state.deps.take();
        on_done(Evaluation { outcome, deps });
    }
}

/// Suspend on `pending`, resuming the walk at `index` once it resolves.
fn suspend(state: &Rc<EvalState>, index: usize, pending: &crate::core::pending::Pending<Value>) {
    notify_suspend(state);
    let resume = state.clone();
    let registration = pending.subscribe(move |value| advance(&resume, index, value));
    *state.waiting.borrow_mut() = Some(registration);
}

fn notify_suspend(state: &Rc<EvalState>) {
    if let Some(on_suspend) = &state.on_suspend {
        let snapshot = state.deps.borrow().clone();
        on_suspend(&snapshot);
    }
}

/// Walk segments from `index` over `current` until done or suspended.
fn advance(state: &Rc<EvalState>, mut index: usize, mut current: Value) {
    if state.cancelled.get() {
        return;
    }

    let segments = state.path.segments();
    let stop = match state.mode {
        Mode::Read => segments.len(),
        Mode::Write { .. } => segments.len().saturating_sub(1),
    };

    while index < stop || matches!(current, Value::Pending(_)) {
        // Unwrap awaitable layers first; a pending may resolve to another
        // pending, in which case we suspend again.
        if let Value::Pending(pending) = &current {
            let pending = pending.clone();
            suspend(state, index, &pending);
            return;
        }

        match &segments[index] {
            Segment::Member { name, .. } => match &current {
                Value::Null => return finish(state, Outcome::Failure),
                Value::Object(object) => {
                    state.deps.borrow_mut().push(Dependency::Member {
                        target: object.clone(),
                        member: name.clone(),
                    });
                    match object.get_member(name) {
                        Some(value) => current = value,
                        None => {
                            return finish(
                                state,
                                Outcome::Fault(Fault::at(
                                    format!("unknown member `{name}`"),
                                    state.path.display(),
                                )),
                            );
                        }
                    }
                }
                other => {
                    return finish(
                        state,
                        Outcome::Fault(Fault::at(
                            format!("member `{name}` accessed on {}", other.type_name()),
                            state.path.display(),
                        )),
                    );
                }
            },
            Segment::Index(i) => match &current {
                Value::Null => return finish(state, Outcome::Failure),
                Value::List(list) => {
                    state
                        .deps
                        .borrow_mut()
                        .push(Dependency::Collection(list.clone()));
                    match list.get(*i) {
                        Some(value) => current = value,
                        // Out of range reads as "no value yet"
                        None => return finish(state, Outcome::Failure),
                    }
                }
                other => {
                    return finish(
                        state,
                        Outcome::Fault(Fault::at(
                            format!("index [{i}] applied to {}", other.type_name()),
                            state.path.display(),
                        )),
                    );
                }
            },
            Segment::Convert { name, func } => match &current {
                Value::Null => return finish(state, Outcome::Failure),
                value => match func(value) {
                    Ok(converted) => current = converted,
                    Err(fault) => {
                        return finish(
                            state,
                            Outcome::Fault(fault.with_path(state.path.display())),
                        );
                    }
                },
            },
            Segment::Select(func) => match &current {
                Value::Null => return finish(state, Outcome::Failure),
                Value::List(list) => {
                    state
                        .deps
                        .borrow_mut()
                        .push(Dependency::Collection(list.clone()));
                    let mapped: Vec<Value> = list.snapshot().iter().map(|v| func(v)).collect();
                    current = Value::List(ObservableList::from_values(mapped));
                }
                other => {
                    return finish(
                        state,
                        Outcome::Fault(Fault::at(
                            format!("select applied to {}", other.type_name()),
                            state.path.display(),
                        )),
                    );
                }
            },
            Segment::Where(pred) => match &current {
                Value::Null => return finish(state, Outcome::Failure),
                Value::List(list) => {
                    state
                        .deps
                        .borrow_mut()
                        .push(Dependency::Collection(list.clone()));
                    let kept: Vec<Value> =
                        list.snapshot().into_iter().filter(|v| pred(v)).collect();
                    current = Value::List(ObservableList::from_values(kept));
                }
                other => {
                    return finish(
                        state,
                        Outcome::Fault(Fault::at(
                            format!("where applied to {}", other.type_name()),
                            state.path.display(),
                        )),
                    );
                }
            },
        }
        index += 1;
    }

    match &state.mode {
        Mode::Read => finish(state, Outcome::Success(current)),
        Mode::Write { .. } => write_terminal(state, current),
    }
}

/// Assign the write value through the terminal member of `owner`.
fn write_terminal(state: &Rc<EvalState>, owner: Value) {
    let Some(Segment::Member { name, settable }) = state.path.segments().last() else {
        return finish(
            state,
            Outcome::Fault(Fault::at(
                "write target is not a member",
                state.path.display(),
            )),
        );
    };
    if !*settable {
        return finish(
            state,
            Outcome::Fault(Fault::at(
                format!("member `{name}` is read-only"),
                state.path.display(),
            )),
        );
    }

    let object = match owner {
        Value::Null => return finish(state, Outcome::Failure),
        Value::Object(object) => object,
        other => {
            return finish(
                state,
                Outcome::Fault(Fault::at(
                    format!("cannot assign member `{name}` on {}", other.type_name()),
                    state.path.display(),
                )),
            );
        }
    };

    let value = match &state.mode {
        Mode::Write { value } => value.borrow_mut().take(),
        Mode::Read => None,
    };
    let Some(value) = value else {
        return; // value already consumed by an earlier resumption
    };

    // The terminal member is part of the side's dependency tree: external
    // writes to it must re-trigger the cycle.
    state.deps.borrow_mut().push(Dependency::Member {
        target: object.clone(),
        member: name.clone(),
    });

    // A pending write value suspends until it resolves, then assigns.
    if let Value::Pending(pending) = &value {
        notify_suspend(state);
        let pending = pending.clone();
        let resume = state.clone();
        let owner = object.clone();
        let name = name.clone();
        let registration = pending.subscribe(move |resolved| {
            if resume.cancelled.get() {
                return;
            }
            assign(&resume, &owner, &name, resolved);
        });
        *state.waiting.borrow_mut() = Some(registration);
        return;
    }

    assign(state, &object, name, value);
}

fn assign(state: &Rc<EvalState>, object: &Rc<dyn DataObject>, member: &str, value: Value) {
    match object.set_member(member, value.clone()) {
        Ok(()) => finish(state, Outcome::Success(value)),
        Err(fault) => finish(
            state,
            Outcome::Fault(fault.with_path(state.path.display())),
        ),
    }
}

// =============================================================================
// EVAL HANDLE
// =============================================================================

struct EvalHandle {
    state: Rc<EvalState>,
}

impl Dispose for EvalHandle {
    fn dispose(&self) {
        self.state.cancelled.set(true);
        if let Some(registration) = self.state.waiting.borrow_mut().take() {
            registration.dispose();
        }
        self.state.on_done.borrow_mut().take();
    }
}

// =============================================================================
// ACCESSOR
// =============================================================================

/// Evaluates an access path against source values.
#[derive(Clone)]
pub struct Accessor {
    path: AccessPath,
}

impl Accessor {
    pub fn new(path: AccessPath) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &AccessPath {
        &self.path
    }

    /// Evaluate the path. The callback fires exactly once (unless the
    /// returned handle is disposed first).
    pub fn read(&self, source: &Value, on_done: EvalCallback) -> DisposeHandle {
        self.start(Mode::Read, source, None, on_done)
    }

    /// Like `read`, but `on_suspend` fires with the partial dependency trace
    /// each time the evaluation parks on a pending value. Callers that need
    /// to stay re-triggerable during long suspensions subscribe from it.
    pub fn read_with(
        &self,
        source: &Value,
        on_suspend: impl Fn(&[Dependency]) + 'static,
        on_done: EvalCallback,
    ) -> DisposeHandle {
        self.start(Mode::Read, source, Some(Box::new(on_suspend)), on_done)
    }

    /// Write `value` through the path's terminal settable member.
    pub fn write(&self, source: &Value, value: Value, on_done: EvalCallback) -> DisposeHandle {
        self.start_write(source, value, None, on_done)
    }

    pub fn write_with(
        &self,
        source: &Value,
        value: Value,
        on_suspend: impl Fn(&[Dependency]) + 'static,
        on_done: EvalCallback,
    ) -> DisposeHandle {
        self.start_write(source, value, Some(Box::new(on_suspend)), on_done)
    }

    fn start_write(
        &self,
        source: &Value,
        value: Value,
        on_suspend: Option<Box<dyn Fn(&[Dependency])>>,
        on_done: EvalCallback,
    ) -> DisposeHandle {
        if !self.path.is_writable() {
            on_done(Evaluation {
                outcome: Outcome::Fault(Fault::at(
                    "path is not writable",
                    self.path.display(),
                )),
                deps: Vec::new(),
            });
            return crate::core::dispose::DisposeFn::new(|| {});
        }
        self.start(
            Mode::Write {
                value: RefCell::new(Some(value)),
            },
            source,
            on_suspend,
            on_done,
        )
    }

    fn start(
        &self,
        mode: Mode,
        source: &Value,
        on_suspend: Option<Box<dyn Fn(&[Dependency])>>,
        on_done: EvalCallback,
    ) -> DisposeHandle {
        let state = Rc::new(EvalState {
            path: self.path.clone(),
            mode,
            deps: RefCell::new(Vec::new()),
            cancelled: Cell::new(false),
            on_done: RefCell::new(Some(on_done)),
            on_suspend,
            waiting: RefCell::new(None),
        });
        advance(&state, 0, source.clone());
        Rc::new(EvalHandle { state })
    }
}

// =============================================================================
// SCHEDULED ACCESSOR
// =============================================================================

/// Decorator deferring read/write onto a scheduler before evaluating.
/// This is the only suspension point that is voluntary rather than
/// data-driven.
pub struct ScheduledAccessor {
    inner: Accessor,
    scheduler: Rc<dyn Schedule>,
}

struct ScheduledHandle {
    cancelled: Cell<bool>,
    scheduled: RefCell<Option<DisposeHandle>>,
    evaluation: RefCell<Option<DisposeHandle>>,
}

impl Dispose for ScheduledHandle {
    fn dispose(&self) {
        self.cancelled.set(true);
        if let Some(handle) = self.scheduled.borrow_mut().take() {
            handle.dispose();
        }
        if let Some(handle) = self.evaluation.borrow_mut().take() {
            handle.dispose();
        }
    }
}

impl ScheduledAccessor {
    pub fn new(path: AccessPath, scheduler: Rc<dyn Schedule>) -> Self {
        Self::from_accessor(Accessor::new(path), scheduler)
    }

    /// Wrap an existing accessor; evaluations share its path.
    pub fn from_accessor(accessor: Accessor, scheduler: Rc<dyn Schedule>) -> Self {
        Self {
            inner: accessor,
            scheduler,
        }
    }

    pub fn path(&self) -> &AccessPath {
        self.inner.path()
    }

    pub fn read(&self, source: &Value, on_done: EvalCallback) -> DisposeHandle {
        let source = source.clone();
        self.defer(Box::new(move |inner| inner.read(&source, on_done)))
    }

    pub fn read_with(
        &self,
        source: &Value,
        on_suspend: impl Fn(&[Dependency]) + 'static,
        on_done: EvalCallback,
    ) -> DisposeHandle {
        let source = source.clone();
        self.defer(Box::new(move |inner| {
            inner.read_with(&source, on_suspend, on_done)
        }))
    }

    pub fn write(&self, source: &Value, value: Value, on_done: EvalCallback) -> DisposeHandle {
        let source = source.clone();
        self.defer(Box::new(move |inner| inner.write(&source, value, on_done)))
    }

    pub fn write_with(
        &self,
        source: &Value,
        value: Value,
        on_suspend: impl Fn(&[Dependency]) + 'static,
        on_done: EvalCallback,
    ) -> DisposeHandle {
        let source = source.clone();
        self.defer(Box::new(move |inner| {
            inner.write_with(&source, value, on_suspend, on_done)
        }))
    }

    fn defer(&self, run: Box<dyn FnOnce(&Accessor) -> DisposeHandle>) -> DisposeHandle {
        let handle = Rc::new(ScheduledHandle {
            cancelled: Cell::new(false),
            scheduled: RefCell::new(None),
            evaluation: RefCell::new(None),
        });
        let inner = self.inner.clone();
        let handle_clone = handle.clone();
        let registration = self.scheduler.schedule(Box::new(move || {
            if handle_clone.cancelled.get() {
                return;
            }
            let evaluation = run(&inner);
            *handle_clone.evaluation.borrow_mut() = Some(evaluation);
        }));
        *handle.scheduled.borrow_mut() = Some(registration);
        handle
    }
}

// =============================================================================
// TESTS
// =============================================================================
