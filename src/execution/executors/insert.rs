use std::sync::Arc;

use crate::catalog::{IndexInfo, TableInfo};
use crate::common::{RecordId, Result, StrataError};
use crate::execution::{create_executor, Executor, ExecutorContext, InsertPlan, InsertSource};
use crate::tuple::{Schema, Tuple, Value};

/// Inserts rows into a table, maintaining every index registered on it.
/// Rows come either from literal values in the plan or from a child
/// executor; each inserted record is locked exclusively by the driving
/// transaction.
pub struct InsertExecutor {
    ctx: Arc<ExecutorContext>,
    table: Arc<TableInfo>,
    indexes: Vec<Arc<IndexInfo>>,
    child: Option<Box<dyn Executor>>,
    raw_rows: Vec<Vec<Value>>,
    raw_cursor: usize,
}

impl InsertExecutor {
    pub fn new(ctx: &Arc<ExecutorContext>, plan: &InsertPlan) -> Result<Self> {
        let table = ctx
            .catalog
            .table(plan.table_oid)
            .ok_or_else(|| StrataError::TableNotFound(plan.table_oid.to_string()))?;
        let indexes = ctx.catalog.table_indexes(&table.name);
        let (child, raw_rows) = match &plan.source {
            InsertSource::Raw(rows) => (None, rows.clone()),
            InsertSource::Child(child_plan) => {
                (Some(create_executor(ctx, child_plan)?), Vec::new())
            }
        };
        Ok(Self {
            ctx: Arc::clone(ctx),
            table,
            indexes,
            child,
            raw_rows,
            raw_cursor: 0,
        })
    }

    fn next_source_row(&mut self) -> Result<Option<Tuple>> {
        if let Some(child) = self.child.as_mut() {
            return Ok(child
                .next()?
                .map(|(tuple, _)| Tuple::new(Arc::clone(&self.table.schema), tuple.values().to_vec())));
        }
        if self.raw_cursor < self.raw_rows.len() {
            let values = self.raw_rows[self.raw_cursor].clone();
            self.raw_cursor += 1;
            return Ok(Some(Tuple::new(Arc::clone(&self.table.schema), values)));
        }
        Ok(None)
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> Result<()> {
        self.raw_cursor = 0;
        if let Some(child) = self.child.as_mut() {
            child.init()?;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        let Some(tuple) = self.next_source_row()? else {
            return Ok(None);
        };

        let rid = self.table.heap.insert_tuple(&tuple)?;
        if !self.ctx.lock_manager.lock_exclusive(&self.ctx.txn, rid) {
            return Err(StrataError::TransactionAborted(self.ctx.txn.id()));
        }

        for index in &self.indexes {
            let key = tuple.key_from_tuple(&index.key_attrs);
            index.index.insert(key, rid)?;
        }
        Ok(Some((tuple, rid)))
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.table.schema)
    }
}
