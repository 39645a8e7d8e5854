// ============================================================================
// pathbind - Access Paths
//
// An immutable description of a chain of member/index/conversion/query
// accesses rooted at a binding's source value.
// ============================================================================
//
// Built once when a binding is created (via PathBuilder) and shared by all
// subsequent evaluations. Writability and collection metadata are decided
// here and drive direction classification.
// ============================================================================

pub mod accessor;

pub use accessor::{Accessor, Dependency, EvalCallback, Evaluation, Outcome, ScheduledAccessor};

use std::rc::Rc;

use crate::core::error::Fault;
use crate::core::value::Value;

// =============================================================================
// SEGMENT
// =============================================================================

/// A pure value conversion applied mid-path.
pub type ConvertFn = Rc<dyn Fn(&Value) -> Result<Value, Fault>>;

/// A per-item transform for `select` query stages.
pub type SelectFn = Rc<dyn Fn(&Value) -> Value>;

/// A per-item predicate for `where` query stages.
pub type WhereFn = Rc<dyn Fn(&Value) -> bool>;

/// One step of an access path.
#[derive(Clone)]
pub enum Segment {
    /// Named member access on an object.
    Member { name: String, settable: bool },
    /// Positional access into a list.
    Index(usize),
    /// A value conversion; never settable, even over a settable prefix.
    Convert { name: String, func: ConvertFn },
    /// Collection transform: map each item.
    Select(SelectFn),
    /// Collection transform: keep matching items.
    Where(WhereFn),
}

impl Segment {
    fn display(&self) -> String {
        match self {
            Segment::Member { name, .. } => name.clone(),
            Segment::Index(i) => format!("[{i}]"),
            Segment::Convert { name, .. } => format!("{name}()"),
            Segment::Select(_) => "select(..)".to_string(),
            Segment::Where(_) => "where(..)".to_string(),
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// A trailing collection transform, peeled off by `collection_split`.
#[derive(Clone)]
pub enum QueryOp {
    Select(SelectFn),
    Where(WhereFn),
}

// =============================================================================
// ACCESS PATH
// =============================================================================

struct PathInner {
    segments: Vec<Segment>,
    collection: bool,
    display: String,
}

/// An immutable, shareable access path.
#[derive(Clone)]
pub struct AccessPath {
    inner: Rc<PathInner>,
}

impl AccessPath {
    /// Ends in a settable member.
    pub fn is_writable(&self) -> bool {
        matches!(
            self.inner.segments.last(),
            Some(Segment::Member { settable: true, .. })
        )
    }

    /// The path's result exposes a mutable/countable collection capability.
    pub fn is_collection(&self) -> bool {
        self.inner.collection
    }

    /// Only plain member accesses, no index/conversion/query steps.
    pub fn is_plain_member_chain(&self) -> bool {
        self.inner
            .segments
            .iter()
            .all(|s| matches!(s, Segment::Member { .. }))
    }

    /// Whether the path would be writable if its trailing conversions were
    /// stripped. Drives the "conversion strips writability" diagnostic.
    pub fn writable_behind_conversion(&self) -> bool {
        let segments = &self.inner.segments;
        let stripped: &[Segment] = {
            let mut end = segments.len();
            while end > 0 && matches!(segments[end - 1], Segment::Convert { .. }) {
                end -= 1;
            }
            &segments[..end]
        };
        stripped.len() < segments.len()
            && matches!(stripped.last(), Some(Segment::Member { settable: true, .. }))
    }

    /// The path expression, for diagnostics.
    pub fn display(&self) -> &str {
        &self.inner.display
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        &self.inner.segments
    }

    /// Split into the base chain (evaluated to reach the source list) and
    /// the trailing query stages replayed by the diff pipeline.
    pub fn collection_split(&self) -> (AccessPath, Vec<QueryOp>) {
        let segments = &self.inner.segments;
        let split = segments
            .iter()
            .position(|s| matches!(s, Segment::Select(_) | Segment::Where(_)))
            .unwrap_or(segments.len());

        let base_segments: Vec<Segment> = segments[..split].to_vec();
        let queries = segments[split..]
            .iter()
            .map(|s| match s {
                Segment::Select(f) => QueryOp::Select(f.clone()),
                Segment::Where(p) => QueryOp::Where(p.clone()),
                other => panic!("non-query segment `{other:?}` after first query stage"),
            })
            .collect();

        let display = Self::join_display(&base_segments);
        let base = AccessPath {
            inner: Rc::new(PathInner {
                segments: base_segments,
                collection: self.inner.collection,
                display,
            }),
        };
        (base, queries)
    }

    fn join_display(segments: &[Segment]) -> String {
        let mut out = String::new();
        for segment in segments {
            let part = segment.display();
            if !out.is_empty() && !part.starts_with('[') {
                out.push('.');
            }
            out.push_str(&part);
        }
        if out.is_empty() {
            out.push_str("<root>");
        }
        out
    }
}

impl std::fmt::Debug for AccessPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner.display)
    }
}

// =============================================================================
// PATH BUILDER
// =============================================================================

/// Builds an `AccessPath` segment by segment.
///
/// # Example
///
/// ```
/// use pathbind::path::PathBuilder;
///
/// let path = PathBuilder::new()
///     .member("customer")
///     .member("name")
///     .build();
///
/// assert!(path.is_writable());
/// assert_eq!(path.display(), "customer.name");
/// ```
pub struct PathBuilder {
    segments: Vec<Segment>,
    collection: bool,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
            collection: false,
        }
    }

    /// A settable member access.
    pub fn member(mut self, name: &str) -> Self {
        self.segments.push(Segment::Member {
            name: name.to_string(),
            settable: true,
        });
        self
    }

    /// A read-only member access.
    pub fn readonly_member(mut self, name: &str) -> Self {
        self.segments.push(Segment::Member {
            name: name.to_string(),
            settable: false,
        });
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(Segment::Index(index));
        self
    }

    /// A named pure conversion. Conversions strip writability.
    pub fn convert(
        mut self,
        name: &str,
        func: impl Fn(&Value) -> Result<Value, Fault> + 'static,
    ) -> Self {
        self.segments.push(Segment::Convert {
            name: name.to_string(),
            func: Rc::new(func),
        });
        self
    }

    /// A `select` query stage; marks the path as a collection access.
    pub fn select(mut self, func: impl Fn(&Value) -> Value + 'static) -> Self {
        self.segments.push(Segment::Select(Rc::new(func)));
        self.collection = true;
        self
    }

    /// A `where` query stage; marks the path as a collection access.
    pub fn filter(mut self, pred: impl Fn(&Value) -> bool + 'static) -> Self {
        self.segments.push(Segment::Where(Rc::new(pred)));
        self.collection = true;
        self
    }

    /// Mark the path result as a collection even without query stages
    /// (a plain member holding a list).
    pub fn collection(mut self) -> Self {
        self.collection = true;
        self
    }

    pub fn build(self) -> AccessPath {
        let display = AccessPath::join_display(&self.segments);
        AccessPath {
            inner: Rc::new(PathInner {
                segments: self.segments,
                collection: self.collection,
                display,
            }),
        }
    }
}

impl Default for PathBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
