// ============================================================================
// pathbind - Subscription Registries
//
// Ref-counted fan-out of change notifications. Bindings never subscribe to
// data objects or lists directly; they go through these registries, which
// guarantee one underlying subscription per observed source no matter how
// many bindings watch it.
// ============================================================================

pub mod collection;
pub mod member;

pub use collection::{CollectionChangeFn, CollectionRegistry};
pub use member::{MemberChangeFn, MemberRegistry, Strategy};
