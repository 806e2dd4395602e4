use std::collections::HashSet;
use std::sync::Arc;

use crate::common::{RecordId, Result};
use crate::execution::executor::ValuesKey;
use crate::execution::{create_executor, DistinctPlan, Executor, ExecutorContext};
use crate::tuple::{Schema, Tuple};

/// Yields the first occurrence of each distinct child row, tracking seen
/// rows by value.
pub struct DistinctExecutor {
    child: Box<dyn Executor>,
    seen: HashSet<ValuesKey>,
}

impl DistinctExecutor {
    pub fn new(ctx: &Arc<ExecutorContext>, plan: &DistinctPlan) -> Result<Self> {
        Ok(Self {
            child: create_executor(ctx, &plan.child)?,
            seen: HashSet::new(),
        })
    }
}

impl Executor for DistinctExecutor {
    fn init(&mut self) -> Result<()> {
        self.seen.clear();
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        while let Some((tuple, rid)) = self.child.next()? {
            if self.seen.insert(ValuesKey(tuple.values().to_vec())) {
                return Ok(Some((tuple, rid)));
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> Arc<Schema> {
        self.child.output_schema()
    }
}
