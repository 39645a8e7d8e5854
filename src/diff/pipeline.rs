// ============================================================================
// pathbind - Diff Replay Pipeline
//
// Replays per-item map and filter stages over collection changes instead of
// re-running the query. Each stage keeps a materialized view of its output;
// a filter stage additionally keeps a visibility bit per upstream item so it
// can translate upstream positions into downstream ones.
//
// Contract: enumerate() must run before the first process() - processing a
// change against a pipeline that never saw the source is a programming
// error and panics. Invalidate flows through untransformed and resets the
// enumerated flag, forcing the owner to re-enumerate.
// ============================================================================

use std::cell::{Cell, RefCell};

use crate::core::value::Value;
use crate::path::QueryOp;

use super::CollectionChange;

// =============================================================================
// STAGES
// =============================================================================

enum StageKind {
    Map(crate::path::SelectFn),
    Filter {
        pred: crate::path::WhereFn,
        /// One bit per upstream item: does it pass the predicate.
        visible: RefCell<Vec<bool>>,
    },
}

struct Stage {
    kind: StageKind,
    view: RefCell<Vec<Value>>,
}

fn count_visible(bits: &[bool]) -> usize {
    bits.iter().filter(|b| **b).count()
}

// =============================================================================
// PIPELINE
// =============================================================================

/// A chain of map/filter stages replayed over collection changes.
pub struct DiffPipeline {
    stages: Vec<Stage>,
    source_view: RefCell<Vec<Value>>,
    enumerated: Cell<bool>,
}

impl DiffPipeline {
    pub fn new(queries: Vec<QueryOp>) -> Self {
        let stages = queries
            .into_iter()
            .map(|op| Stage {
                kind: match op {
                    QueryOp::Select(func) => StageKind::Map(func),
                    QueryOp::Where(pred) => StageKind::Filter {
                        pred,
                        visible: RefCell::new(Vec::new()),
                    },
                },
                view: RefCell::new(Vec::new()),
            })
            .collect();
        Self {
            stages,
            source_view: RefCell::new(Vec::new()),
            enumerated: Cell::new(false),
        }
    }

    pub fn is_enumerated(&self) -> bool {
        self.enumerated.get()
    }

    /// Materialize every stage from a full source snapshot.
    pub fn enumerate(&self, source: &[Value]) {
        *self.source_view.borrow_mut() = source.to_vec();
        let mut current: Vec<Value> = source.to_vec();
        for stage in &self.stages {
            match &stage.kind {
                StageKind::Map(func) => {
                    current = current.iter().map(|v| func(v)).collect();
                }
                StageKind::Filter { pred, visible } => {
                    let bits: Vec<bool> = current.iter().map(|v| pred(v)).collect();
                    current = current
                        .into_iter()
                        .zip(bits.iter())
                        .filter_map(|(v, keep)| keep.then_some(v))
                        .collect();
                    *visible.borrow_mut() = bits;
                }
            }
            *stage.view.borrow_mut() = current.clone();
        }
        self.enumerated.set(true);
    }

    /// The output of the last stage (the source snapshot if there are none).
    pub fn final_view(&self) -> Vec<Value> {
        match self.stages.last() {
            Some(stage) => stage.view.borrow().clone(),
            None => self.source_view.borrow().clone(),
        }
    }

    /// Replay one source change through every stage, returning the changes
    /// to apply to the pipeline's output. An empty result means the change
    /// was absorbed (e.g. a filtered-out item changed).
    pub fn process(&self, change: &CollectionChange<Value>) -> Vec<CollectionChange<Value>> {
        if !self.enumerated.get() {
            panic!("diff pipeline processed a change before enumerating its source");
        }

        if matches!(change, CollectionChange::Invalidate) {
            self.enumerated.set(false);
            return vec![CollectionChange::Invalidate];
        }

        apply_to_view(&mut self.source_view.borrow_mut(), change);

        let mut changes = vec![change.clone()];
        for stage in &self.stages {
            let mut next = Vec::new();
            for change in &changes {
                match &stage.kind {
                    StageKind::Map(func) => {
                        next.push(replay_map(&mut stage.view.borrow_mut(), func, change));
                    }
                    StageKind::Filter { pred, visible } => {
                        next.extend(replay_filter(
                            &mut stage.view.borrow_mut(),
                            &mut visible.borrow_mut(),
                            pred,
                            change,
                        ));
                    }
                }
            }
            changes = next;
        }
        changes
    }
}

// =============================================================================
// REPLAY
// =============================================================================

/// Mirror `change` into a materialized view.
fn apply_to_view(view: &mut Vec<Value>, change: &CollectionChange<Value>) {
    match change {
        CollectionChange::Insert { index, items } => {
            for (k, item) in items.iter().enumerate() {
                view.insert(index + k, item.clone());
            }
        }
        CollectionChange::Remove { index, items } => {
            view.drain(*index..index + items.len());
        }
        CollectionChange::Replace { index, new, .. } => {
            view[*index] = new.clone();
        }
        CollectionChange::Move { from, to } => {
            let item = view.remove(*from);
            view.insert(*to, item);
        }
        CollectionChange::Clear => view.clear(),
        CollectionChange::Invalidate => {}
    }
}

fn replay_map(
    view: &mut Vec<Value>,
    func: &crate::path::SelectFn,
    change: &CollectionChange<Value>,
) -> CollectionChange<Value> {
    let mapped = match change {
        CollectionChange::Insert { index, items } => CollectionChange::Insert {
            index: *index,
            items: items.iter().map(|v| func(v)).collect(),
        },
        // The removed projections come from the view, not by re-mapping:
        // the map function may not be stable across calls.
        CollectionChange::Remove { index, items } => CollectionChange::Remove {
            index: *index,
            items: view[*index..index + items.len()].to_vec(),
        },
        CollectionChange::Replace { index, new, .. } => CollectionChange::Replace {
            index: *index,
            old: view[*index].clone(),
            new: func(new),
        },
        CollectionChange::Move { from, to } => CollectionChange::Move {
            from: *from,
            to: *to,
        },
        CollectionChange::Clear => CollectionChange::Clear,
        CollectionChange::Invalidate => CollectionChange::Invalidate,
    };
    apply_to_view(view, &mapped);
    mapped
}

/// Replay one upstream change through a filter stage. Range operations are
/// expanded item by item so each visibility bit is settled independently.
fn replay_filter(
    view: &mut Vec<Value>,
    visible: &mut Vec<bool>,
    pred: &crate::path::WhereFn,
    change: &CollectionChange<Value>,
) -> Vec<CollectionChange<Value>> {
    let mut out = Vec::new();
    match change {
        CollectionChange::Insert { index, items } => {
            for (k, item) in items.iter().enumerate() {
                let upstream = index + k;
                let keep = pred(item);
                visible.insert(upstream, keep);
                if keep {
                    let down = count_visible(&visible[..upstream]);
                    view.insert(down, item.clone());
                    out.push(CollectionChange::insert_one(down, item.clone()));
                }
            }
        }
        CollectionChange::Remove { index, items } => {
            for _ in 0..items.len() {
                let keep = visible.remove(*index);
                if keep {
                    let down = count_visible(&visible[..*index]);
                    let removed = view.remove(down);
                    out.push(CollectionChange::remove_one(down, removed));
                }
            }
        }
        CollectionChange::Replace { index, new, .. } => {
            let was = visible[*index];
            let now = pred(new);
            visible[*index] = now;
            let down = count_visible(&visible[..*index]);
            match (was, now) {
                (true, true) => {
                    let old = std::mem::replace(&mut view[down], new.clone());
                    out.push(CollectionChange::Replace {
                        index: down,
                        old,
                        new: new.clone(),
                    });
                }
                (true, false) => {
                    let removed = view.remove(down);
                    out.push(CollectionChange::remove_one(down, removed));
                }
                (false, true) => {
                    view.insert(down, new.clone());
                    out.push(CollectionChange::insert_one(down, new.clone()));
                }
                (false, false) => {}
            }
        }
        CollectionChange::Move { from, to } => {
            let keep = visible[*from];
            let down_from = count_visible(&visible[..*from]);
            let bit = visible.remove(*from);
            visible.insert(*to, bit);
            if keep {
                let down_to = count_visible(&visible[..*to]);
                let item = view.remove(down_from);
                view.insert(down_to, item);
                if down_from != down_to {
                    out.push(CollectionChange::Move {
                        from: down_from,
                        to: down_to,
                    });
                }
            }
        }
        CollectionChange::Clear => {
            visible.clear();
            view.clear();
            out.push(CollectionChange::Clear);
        }
        CollectionChange::Invalidate => out.push(CollectionChange::Invalidate),
    }
    out
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{SelectFn, WhereFn};
    use std::rc::Rc;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|n| Value::Int(*n)).collect()
    }

    fn greater_than(limit: i64) -> WhereFn {
        Rc::new(move |v: &Value| v.as_int().is_some_and(|n| n > limit))
    }

    fn times(factor: i64) -> SelectFn {
        Rc::new(move |v: &Value| Value::Int(v.as_int().unwrap_or(0) * factor))
    }

    #[test]
    #[should_panic(expected = "before enumerating")]
    fn processing_before_enumeration_panics() {
        let pipeline = DiffPipeline::new(vec![QueryOp::Where(greater_than(0))]);
        pipeline.process(&CollectionChange::Clear);
    }

    #[test]
    fn map_stage_projects_changes() {
        let pipeline = DiffPipeline::new(vec![QueryOp::Select(times(10))]);
        pipeline.enumerate(&ints(&[1, 2]));
        assert_eq!(pipeline.final_view(), ints(&[10, 20]));

        let out = pipeline.process(&CollectionChange::insert_one(1, Value::Int(5)));
        assert_eq!(out, vec![CollectionChange::insert_one(1, Value::Int(50))]);
        assert_eq!(pipeline.final_view(), ints(&[10, 50, 20]));
    }

    #[test]
    fn replace_crossing_into_the_filter_becomes_insert() {
        let pipeline = DiffPipeline::new(vec![QueryOp::Where(greater_than(2))]);
        pipeline.enumerate(&ints(&[1, 2, 3, 4]));
        assert_eq!(pipeline.final_view(), ints(&[3, 4]));

        // 2 -> 5 crosses the predicate: the downstream sees an insert at
        // the translated position, not a replace.
        let out = pipeline.process(&CollectionChange::Replace {
            index: 1,
            old: Value::Int(2),
            new: Value::Int(5),
        });
        assert_eq!(out, vec![CollectionChange::insert_one(0, Value::Int(5))]);
        assert_eq!(pipeline.final_view(), ints(&[5, 3, 4]));
    }

    #[test]
    fn replace_leaving_the_filter_becomes_remove() {
        let pipeline = DiffPipeline::new(vec![QueryOp::Where(greater_than(2))]);
        pipeline.enumerate(&ints(&[1, 2, 3, 4]));

        let out = pipeline.process(&CollectionChange::Replace {
            index: 2,
            old: Value::Int(3),
            new: Value::Int(0),
        });
        assert_eq!(out, vec![CollectionChange::remove_one(0, Value::Int(3))]);
        assert_eq!(pipeline.final_view(), ints(&[4]));
    }

    #[test]
    fn invisible_changes_are_absorbed() {
        let pipeline = DiffPipeline::new(vec![QueryOp::Where(greater_than(2))]);
        pipeline.enumerate(&ints(&[1, 2, 3, 4]));

        let out = pipeline.process(&CollectionChange::Replace {
            index: 0,
            old: Value::Int(1),
            new: Value::Int(2),
        });
        assert!(out.is_empty());
        assert_eq!(pipeline.final_view(), ints(&[3, 4]));
    }

    #[test]
    fn range_insert_expands_through_the_filter() {
        let pipeline = DiffPipeline::new(vec![QueryOp::Where(greater_than(2))]);
        pipeline.enumerate(&ints(&[3]));

        let out = pipeline.process(&CollectionChange::Insert {
            index: 0,
            items: ints(&[1, 4, 2, 5]),
        });
        assert_eq!(
            out,
            vec![
                CollectionChange::insert_one(0, Value::Int(4)),
                CollectionChange::insert_one(1, Value::Int(5)),
            ]
        );
        assert_eq!(pipeline.final_view(), ints(&[4, 5, 3]));
    }

    #[test]
    fn chained_stages_compose() {
        let pipeline = DiffPipeline::new(vec![
            QueryOp::Where(greater_than(2)),
            QueryOp::Select(times(10)),
        ]);
        pipeline.enumerate(&ints(&[1, 2, 3, 4]));
        assert_eq!(pipeline.final_view(), ints(&[30, 40]));

        let out = pipeline.process(&CollectionChange::insert_one(0, Value::Int(9)));
        assert_eq!(out, vec![CollectionChange::insert_one(0, Value::Int(90))]);
        assert_eq!(pipeline.final_view(), ints(&[90, 30, 40]));
    }

    #[test]
    fn move_translates_visible_positions() {
        let pipeline = DiffPipeline::new(vec![QueryOp::Where(greater_than(2))]);
        pipeline.enumerate(&ints(&[3, 1, 4]));
        assert_eq!(pipeline.final_view(), ints(&[3, 4]));

        // 3 moves past 4 upstream; downstream it moves from 0 to 1
        let out = pipeline.process(&CollectionChange::Move { from: 0, to: 2 });
        assert_eq!(out, vec![CollectionChange::Move { from: 0, to: 1 }]);
        assert_eq!(pipeline.final_view(), ints(&[4, 3]));
    }

    #[test]
    fn invalidate_resets_enumeration() {
        let pipeline = DiffPipeline::new(vec![QueryOp::Where(greater_than(2))]);
        pipeline.enumerate(&ints(&[3]));

        let out = pipeline.process(&CollectionChange::Invalidate);
        assert_eq!(out, vec![CollectionChange::Invalidate]);
        assert!(!pipeline.is_enumerated());

        pipeline.enumerate(&ints(&[5, 1]));
        assert_eq!(pipeline.final_view(), ints(&[5]));
    }
}
