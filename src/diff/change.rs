// ============================================================================
// pathbind - Collection Change Model
//
// Typed description of one mutation to a sequence, position-addressed so a
// downstream consumer can mirror the mutation without re-enumerating.
// ============================================================================

// =============================================================================
// CHANGE
// =============================================================================

/// One mutation to an observed sequence.
///
/// `Invalidate` is the escape hatch: it carries no positions and tells the
/// consumer its mirror can no longer be trusted and must be rebuilt from the
/// source.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionChange<T> {
    /// `items` inserted so the first lands at `index`.
    Insert { index: usize, items: Vec<T> },
    /// `items` removed starting at `index` (items are the removed values).
    Remove { index: usize, items: Vec<T> },
    /// The item at `index` swapped from `old` to `new`.
    Replace { index: usize, old: T, new: T },
    /// The item at `from` relocated to `to`.
    Move { from: usize, to: usize },
    /// All items removed.
    Clear,
    /// Positional bookkeeping lost; rebuild from source.
    Invalidate,
}

impl<T> CollectionChange<T> {
    pub fn insert_one(index: usize, item: T) -> Self {
        CollectionChange::Insert {
            index,
            items: vec![item],
        }
    }

    pub fn remove_one(index: usize, item: T) -> Self {
        CollectionChange::Remove {
            index,
            items: vec![item],
        }
    }

    /// The single inserted item, when this is a one-item insert.
    pub fn added(&self) -> Option<(usize, &T)> {
        match self {
            CollectionChange::Insert { index, items } if items.len() == 1 => {
                Some((*index, &items[0]))
            }
            _ => None,
        }
    }

    /// The single removed item, when this is a one-item remove.
    pub fn removed(&self) -> Option<(usize, &T)> {
        match self {
            CollectionChange::Remove { index, items } if items.len() == 1 => {
                Some((*index, &items[0]))
            }
            _ => None,
        }
    }

    /// Map the carried items, preserving shape and positions.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> CollectionChange<U> {
        match self {
            CollectionChange::Insert { index, items } => CollectionChange::Insert {
                index: *index,
                items: items.iter().map(&mut f).collect(),
            },
            CollectionChange::Remove { index, items } => CollectionChange::Remove {
                index: *index,
                items: items.iter().map(&mut f).collect(),
            },
            CollectionChange::Replace { index, old, new } => CollectionChange::Replace {
                index: *index,
                old: f(old),
                new: f(new),
            },
            CollectionChange::Move { from, to } => CollectionChange::Move {
                from: *from,
                to: *to,
            },
            CollectionChange::Clear => CollectionChange::Clear,
            CollectionChange::Invalidate => CollectionChange::Invalidate,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
