use std::sync::Arc;

use crate::catalog::TableInfo;
use crate::common::{RecordId, Result, StrataError};
use crate::execution::{Executor, ExecutorContext, SeqScanPlan};
use crate::storage::TableIterator;
use crate::tuple::{Schema, Tuple};

/// Walks the table heap front to back, yielding tuples the predicate
/// accepts.
pub struct SeqScanExecutor {
    plan: SeqScanPlan,
    table: Arc<TableInfo>,
    iter: Option<TableIterator>,
}

impl SeqScanExecutor {
    pub fn new(ctx: &Arc<ExecutorContext>, plan: &SeqScanPlan) -> Result<Self> {
        let table = ctx
            .catalog
            .table(plan.table_oid)
            .ok_or_else(|| StrataError::TableNotFound(plan.table_oid.to_string()))?;
        Ok(Self {
            plan: plan.clone(),
            table,
            iter: None,
        })
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> Result<()> {
        self.iter = Some(self.table.heap.iter(Arc::clone(&self.table.schema)));
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        let iter = self.iter.as_mut().expect("init not called");
        for item in iter {
            let (tuple, rid) = item?;
            let accepted = match &self.plan.predicate {
                None => true,
                Some(predicate) => predicate.evaluate(&tuple)?.as_bool(),
            };
            if accepted {
                return Ok(Some((tuple, rid)));
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.table.schema)
    }
}
