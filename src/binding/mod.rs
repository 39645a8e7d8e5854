// ============================================================================
// pathbind - Binding Orchestration
//
// Classification of path pairs into flow directions, the binding engine
// that keeps both sides synchronized, and the event/composite wrappers
// built on top of it.
// ============================================================================

pub mod classify;
pub mod composite;
pub mod engine;
pub mod event;

pub use classify::{classify, Classification, SideIndex};
pub use composite::CompositeBinding;
pub use engine::Binding;
pub use event::EventBinding;
