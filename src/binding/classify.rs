// ============================================================================
// pathbind - Binding Direction Classification
//
// Decides, from the shape of the two access paths alone, which way values
// flow and whether the binding synchronizes scalars or collections. Runs
// once, at bind time; an unbindable pair is a configuration error, reported
// synchronously and never retried.
// ============================================================================

use crate::core::error::BindError;
use crate::path::AccessPath;

// =============================================================================
// SIDES
// =============================================================================

/// Which of the two bound paths a value or change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideIndex {
    Left = 0,
    Right = 1,
}

impl SideIndex {
    pub fn other(self) -> SideIndex {
        match self {
            SideIndex::Left => SideIndex::Right,
            SideIndex::Right => SideIndex::Left,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SideIndex::Left => "left",
            SideIndex::Right => "right",
        }
    }
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// The synchronization shape of one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// The side read first; in one-way bindings, the only side ever read.
    pub source: SideIndex,
    pub two_way: bool,
    pub collection: bool,
}

/// Classify a path pair. Checked in order, first match wins.
///
/// - Both writable: two-way scalar; the right side seeds the first sync.
/// - Exactly one writable: one-way scalar into the writable side.
/// - Neither writable, the left side is a collection through a plain member
///   chain or the right side is not a collection: the left side reads,
///   collection diffs propagate left to right.
/// - Neither writable, the right side is a collection: the right side reads,
///   diffs propagate right to left.
/// - Anything else cannot be bound.
pub fn classify(left: &AccessPath, right: &AccessPath) -> Result<Classification, BindError> {
    match (left.is_writable(), right.is_writable()) {
        (true, true) => Ok(Classification {
            source: SideIndex::Right,
            two_way: true,
            collection: false,
        }),
        (true, false) => Ok(Classification {
            source: SideIndex::Right,
            two_way: false,
            collection: false,
        }),
        (false, true) => Ok(Classification {
            source: SideIndex::Left,
            two_way: false,
            collection: false,
        }),
        (false, false) => classify_unwritable(left, right),
    }
}

fn classify_unwritable(
    left: &AccessPath,
    right: &AccessPath,
) -> Result<Classification, BindError> {
    // A side reading for a collection binding needs to be a collection
    // itself; the opposite side receives, as a physical list when it is one
    // and through path invalidation otherwise.
    if left.is_collection() && (left.is_plain_member_chain() || !right.is_collection()) {
        return Ok(Classification {
            source: SideIndex::Left,
            two_way: false,
            collection: true,
        });
    }
    if right.is_collection() {
        return Ok(Classification {
            source: SideIndex::Right,
            two_way: false,
            collection: true,
        });
    }

    // A settable member hidden behind a conversion gets the specific
    // diagnostic; it is the common way to end up here by accident.
    for path in [left, right] {
        if path.writable_behind_conversion() {
            return Err(BindError::ConversionStripsWritability {
                path: path.display().to_string(),
            });
        }
    }

    Err(BindError::NeitherSideWritable {
        left: left.display().to_string(),
        right: right.display().to_string(),
    })
}

// =============================================================================
// TESTS
// =============================================================================
