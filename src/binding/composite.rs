// ============================================================================
// pathbind - Composite Binding
//
// Groups bindings so a whole screenful can be bound, re-sourced and torn
// down as one unit. Bind errors surface eagerly: the first failing member
// aborts the bind and unwinds the members already bound.
// ============================================================================

use std::cell::RefCell;

use crate::core::dispose::Dispose;
use crate::core::error::BindError;
use crate::core::value::Value;

use super::engine::Binding;

#[derive(Default)]
pub struct CompositeBinding {
    members: RefCell<Vec<Binding>>,
}

impl CompositeBinding {
    pub fn new() -> Self {
        Self {
            members: RefCell::new(Vec::new()),
        }
    }

    pub fn add(&self, binding: Binding) {
        self.members.borrow_mut().push(binding);
    }

    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    /// Bind every member; on the first error, unbind the ones already bound
    /// and return the error.
    pub fn bind(&self) -> Result<(), BindError> {
        let members = self.members.borrow().clone();
        for (bound_so_far, binding) in members.iter().enumerate() {
            if let Err(error) = binding.bind() {
                for earlier in &members[..bound_so_far] {
                    earlier.unbind();
                }
                return Err(error);
            }
        }
        Ok(())
    }

    pub fn unbind(&self) {
        for binding in self.members.borrow().iter() {
            binding.unbind();
        }
    }

    pub fn set_source(&self, source: Value) {
        for binding in self.members.borrow().iter() {
            binding.set_source(source.clone());
        }
    }
}

impl Dispose for CompositeBinding {
    fn dispose(&self) {
        for binding in self.members.take() {
            binding.dispose();
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::services::BindingServices;
    use crate::core::value::Record;
    use crate::path::PathBuilder;

    #[test]
    fn binds_and_unbinds_members_together() {
        let services = BindingServices::new();
        let root = Record::with([
            ("a", Value::Int(1)),
            ("b", Value::Int(2)),
            ("c", Value::Int(3)),
            ("d", Value::Int(4)),
        ]);
        let source = Value::object(root.clone());

        let composite = CompositeBinding::new();
        composite.add(Binding::new(
            services.clone(),
            source.clone(),
            PathBuilder::new().member("a").build(),
            PathBuilder::new().member("b").build(),
        ));
        composite.add(Binding::new(
            services.clone(),
            source,
            PathBuilder::new().member("c").build(),
            PathBuilder::new().member("d").build(),
        ));

        composite.bind().unwrap();
        assert_eq!(root.get("a"), Some(Value::Int(2)));
        assert_eq!(root.get("c"), Some(Value::Int(4)));

        composite.unbind();
        assert_eq!(services.members().entry_count(), 0);
    }

    #[test]
    fn first_failure_unwinds_earlier_members() {
        let services = BindingServices::new();
        let root = Record::with([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let source = Value::object(root);

        let composite = CompositeBinding::new();
        composite.add(Binding::new(
            services.clone(),
            source.clone(),
            PathBuilder::new().member("a").build(),
            PathBuilder::new().member("b").build(),
        ));
        // Unbindable: neither side is writable or a collection
        composite.add(Binding::new(
            services.clone(),
            source,
            PathBuilder::new().readonly_member("a").build(),
            PathBuilder::new().readonly_member("b").build(),
        ));

        assert!(composite.bind().is_err());
        assert_eq!(services.members().entry_count(), 0);
    }
}
