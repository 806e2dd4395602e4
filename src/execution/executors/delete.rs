use std::sync::Arc;

use crate::catalog::{IndexInfo, TableInfo};
use crate::common::{RecordId, Result, StrataError};
use crate::execution::{create_executor, DeletePlan, Executor, ExecutorContext};
use crate::tuple::{Schema, Tuple};

/// Tombstones every row the child yields and removes its key from each
/// index, keying by the tuple's value in the index's key columns. All
/// work happens in `init`.
pub struct DeleteExecutor {
    ctx: Arc<ExecutorContext>,
    table: Arc<TableInfo>,
    indexes: Vec<Arc<IndexInfo>>,
    child: Box<dyn Executor>,
}

impl DeleteExecutor {
    pub fn new(ctx: &Arc<ExecutorContext>, plan: &DeletePlan) -> Result<Self> {
        let table = ctx
            .catalog
            .table(plan.table_oid)
            .ok_or_else(|| StrataError::TableNotFound(plan.table_oid.to_string()))?;
        let indexes = ctx.catalog.table_indexes(&table.name);
        let child = create_executor(ctx, &plan.child)?;
        Ok(Self {
            ctx: Arc::clone(ctx),
            table,
            indexes,
            child,
        })
    }
}

impl Executor for DeleteExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()?;

        while let Some((tuple, rid)) = self.child.next()? {
            if !self.ctx.lock_manager.lock_exclusive(&self.ctx.txn, rid) {
                return Err(StrataError::TransactionAborted(self.ctx.txn.id()));
            }

            self.table.heap.mark_delete(rid)?;
            for index in &self.indexes {
                let key = tuple.key_from_tuple(&index.key_attrs);
                index.index.remove(key, rid)?;
            }
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        Ok(None)
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.table.schema)
    }
}
