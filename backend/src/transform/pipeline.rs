//! Pipeline: an ordered operation sequence and the engine that runs it.
//!
//! Operations apply strictly left-to-right; the output of step *i* is the
//! exclusive input of step *i+1*. There is no reordering or optimization —
//! user intent is preserved literally. A failure at any step aborts the whole
//! run with the 0-based step index; no partial result is produced.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::models::{DerivedDataset, RawDataset};
use crate::transform::ops::Operation;

/// An ordered sequence of operations, owned by one session.
///
/// Two pipelines are equal iff their operation sequences are equal
/// element-wise. The content hash is built from the operations' stable
/// describe strings, so it depends on kind and parameters, never on
/// object identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pipeline {
    ops: Vec<Operation>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ops(ops: Vec<Operation>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Append an operation at the end.
    pub fn push(&mut self, op: Operation) {
        self.ops.push(op);
    }

    /// Remove and return the operation at `index`, or `None` when out of
    /// bounds.
    pub fn remove(&mut self, index: usize) -> Option<Operation> {
        if index < self.ops.len() {
            Some(self.ops.remove(index))
        } else {
            None
        }
    }

    /// Move the operation at `from` to position `to`, shifting the ones in
    /// between. Returns `false` when either index is out of bounds.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        if from >= self.ops.len() || to >= self.ops.len() {
            return false;
        }
        let op = self.ops.remove(from);
        self.ops.insert(to, op);
        true
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Deterministic hash over the ordered, parameterized description of all
    /// operations. One cache-key component; the other is the dataset
    /// fingerprint.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for op in &self.ops {
            hasher.update(op.describe().as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Run a pipeline over a raw dataset.
///
/// Total and side-effect-free: identical inputs produce identical output,
/// including row order. Intermediate per-step tables are transient and
/// released as the run proceeds. On failure at step *i* the whole run aborts
/// and [`PipelineError`] reports the index and cause.
pub fn run(base: &RawDataset, ops: &[Operation]) -> PipelineResult<DerivedDataset> {
    let mut table = base.table().clone();

    for (index, op) in ops.iter().enumerate() {
        table = op
            .apply(&table)
            .map_err(|cause| PipelineError { index, cause })?;
    }

    Ok(DerivedDataset::new(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApplyErrorKind;
    use crate::models::{InputFormat, Value};
    use crate::parser;
    use crate::transform::ops::FillStrategy;

    fn dataset() -> RawDataset {
        parser::load_bytes(b"id,score\n1,10\n2,\n3,30", InputFormat::Csv).unwrap()
    }

    fn fill_mean(column: &str) -> Operation {
        Operation::FillMissing {
            column: column.into(),
            strategy: FillStrategy::Mean,
        }
    }

    fn drop_columns(column: &str) -> Operation {
        Operation::DropColumns {
            columns: [column.to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn test_run_is_deterministic() {
        let base = dataset();
        let ops = vec![fill_mean("score")];

        let a = run(&base, &ops).unwrap();
        let b = run(&base, &ops).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.table().rows()[1][1], Value::Number(20.0));
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let base = dataset();
        let derived = run(&base, &[]).unwrap();
        assert_eq!(derived.table(), base.table());
    }

    #[test]
    fn test_order_sensitivity() {
        let base = dataset();

        // fill then drop succeeds...
        let fill_then_drop = vec![fill_mean("score"), drop_columns("score")];
        assert!(run(&base, &fill_then_drop).is_ok());

        // ...drop then fill fails at step 1 with unknown column.
        let drop_then_fill = vec![drop_columns("score"), fill_mean("score")];
        let err = run(&base, &drop_then_fill).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.cause.kind, ApplyErrorKind::UnknownColumn);
    }

    #[test]
    fn test_failure_aborts_without_partial_result() {
        let base = dataset();
        let ops = vec![
            drop_columns("score"),
            fill_mean("score"),
            drop_columns("id"),
        ];
        let err = run(&base, &ops).unwrap_err();
        assert_eq!(err.index, 1);
        // The base dataset is untouched.
        assert_eq!(base.schema().len(), 2);
    }

    #[test]
    fn test_pipeline_equality_is_element_wise() {
        let mut a = Pipeline::new();
        a.push(fill_mean("score"));
        let b = Pipeline::from_ops(vec![fill_mean("score")]);
        assert_eq!(a, b);

        a.push(drop_columns("score"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_content_hash_tracks_ops_and_order() {
        let empty = Pipeline::new();
        let one = Pipeline::from_ops(vec![fill_mean("score")]);
        assert_ne!(empty.content_hash(), one.content_hash());

        let ab = Pipeline::from_ops(vec![fill_mean("score"), drop_columns("score")]);
        let ba = Pipeline::from_ops(vec![drop_columns("score"), fill_mean("score")]);
        assert_ne!(ab.content_hash(), ba.content_hash());

        // Equal content, equal hash — identity plays no part.
        assert_eq!(one.content_hash(), Pipeline::from_ops(vec![fill_mean("score")]).content_hash());
    }

    #[test]
    fn test_remove_and_reorder() {
        let mut p = Pipeline::from_ops(vec![fill_mean("score"), drop_columns("score")]);

        assert!(p.reorder(1, 0));
        assert!(matches!(p.ops()[0], Operation::DropColumns { .. }));

        assert!(!p.reorder(0, 5));
        assert!(p.remove(7).is_none());

        let removed = p.remove(0).unwrap();
        assert!(matches!(removed, Operation::DropColumns { .. }));
        assert_eq!(p.len(), 1);
    }
}
