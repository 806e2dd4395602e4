use std::sync::Arc;

use crate::common::{RecordId, Result};
use crate::execution::{create_executor, Executor, ExecutorContext, LimitPlan};
use crate::tuple::{Schema, Tuple};

/// Forwards at most `limit` tuples from its child.
pub struct LimitExecutor {
    limit: usize,
    emitted: usize,
    child: Box<dyn Executor>,
}

impl LimitExecutor {
    pub fn new(ctx: &Arc<ExecutorContext>, plan: &LimitPlan) -> Result<Self> {
        Ok(Self {
            limit: plan.limit,
            emitted: 0,
            child: create_executor(ctx, &plan.child)?,
        })
    }
}

impl Executor for LimitExecutor {
    fn init(&mut self) -> Result<()> {
        self.emitted = 0;
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if self.emitted >= self.limit {
            return Ok(None);
        }
        match self.child.next()? {
            Some(item) => {
                self.emitted += 1;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    fn output_schema(&self) -> Arc<Schema> {
        self.child.output_schema()
    }
}
