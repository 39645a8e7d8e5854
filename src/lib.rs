// ============================================================================
// pathbind - Bidirectional Access-Path Data Binding
// ============================================================================
//
// Keeps two sides of an object graph synchronized through declarative
// access paths. A binding pairs two paths over a shared source value,
// classifies which way values can flow from the paths' shape alone, runs
// the initial sync and then re-runs whenever any dependency it touched
// raises a change. Collection-shaped bindings replay map/filter query
// stages over typed diffs instead of re-enumerating the source.
// ============================================================================

pub mod binding;
pub mod core;
pub mod diff;
pub mod path;
pub mod subscribe;

// Re-export the working vocabulary at the crate root
pub use crate::core::dispose::{DisposableContainer, Dispose, DisposeFn, DisposeHandle};
pub use crate::core::error::{BindError, CatchFault, CollectingSink, Fault, FaultReport, PanicSink};
pub use crate::core::events::{EventTable, ListEvent, MemberChangedSignal, ObservableList};
pub use crate::core::pending::Pending;
pub use crate::core::services::{BindingServices, ManualScheduler, Schedule};
pub use crate::core::value::{object_key, DataObject, Record, Value};

pub use path::{
    AccessPath, Accessor, Dependency, EvalCallback, Evaluation, Outcome, PathBuilder,
    ScheduledAccessor,
};

pub use diff::{CollectionChange, DiffPipeline};
pub use subscribe::{CollectionRegistry, MemberRegistry, Strategy};

pub use binding::{classify, Binding, Classification, CompositeBinding, EventBinding, SideIndex};

// =============================================================================
// TESTS
// =============================================================================
