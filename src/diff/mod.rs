// ============================================================================
// pathbind - Collection Diff Propagation
//
// The typed change model for observed sequences plus the staged replay
// pipeline that pushes per-item map and filter transforms through changes
// without re-enumerating the source.
// ============================================================================

pub mod change;
pub mod pipeline;

pub use change::CollectionChange;
pub use pipeline::DiffPipeline;
