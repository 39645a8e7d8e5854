// ============================================================================
// pathbind - Core Building Blocks
// ============================================================================
//
// Everything the binding layers share: the dynamic value domain, disposal
// primitives, awaitable values, change-notification surfaces, the error
// taxonomy and the service bundle bindings are constructed with.
// ============================================================================

pub mod dispose;
pub mod error;
pub mod events;
pub mod pending;
pub mod services;
pub mod value;
