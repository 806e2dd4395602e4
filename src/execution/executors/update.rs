use std::sync::Arc;

use crate::catalog::{IndexInfo, TableInfo};
use crate::common::{RecordId, Result, StrataError};
use crate::execution::{
    create_executor, Executor, ExecutorContext, UpdateAction, UpdatePlan,
};
use crate::tuple::{Schema, Tuple, Value};

/// Applies the plan's per-column actions to every row the child yields,
/// updating the heap in place and re-keying every index (old key out, new
/// key in). All work happens in `init`; `next` only reports completion.
pub struct UpdateExecutor {
    ctx: Arc<ExecutorContext>,
    plan: UpdatePlan,
    table: Arc<TableInfo>,
    indexes: Vec<Arc<IndexInfo>>,
    child: Box<dyn Executor>,
}

impl UpdateExecutor {
    pub fn new(ctx: &Arc<ExecutorContext>, plan: &UpdatePlan) -> Result<Self> {
        let table = ctx
            .catalog
            .table(plan.table_oid)
            .ok_or_else(|| StrataError::TableNotFound(plan.table_oid.to_string()))?;
        let indexes = ctx.catalog.table_indexes(&table.name);
        let child = create_executor(ctx, &plan.child)?;
        Ok(Self {
            ctx: Arc::clone(ctx),
            plan: plan.clone(),
            table,
            indexes,
            child,
        })
    }

    /// Builds the updated row: untouched columns copy through, `Set`
    /// replaces, `Add` increments.
    fn generate_updated_tuple(&self, src: &Tuple) -> Result<Tuple> {
        let mut values = Vec::with_capacity(src.values().len());
        for (idx, value) in src.values().iter().enumerate() {
            match self.plan.update_attrs.get(&idx) {
                None => values.push(value.clone()),
                Some(UpdateAction::Set(v)) => values.push(Value::Integer(*v)),
                Some(UpdateAction::Add(v)) => values.push(value.add(&Value::Integer(*v))?),
            }
        }
        Ok(Tuple::new(Arc::clone(&self.table.schema), values))
    }
}

impl Executor for UpdateExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()?;

        while let Some((tuple, rid)) = self.child.next()? {
            if !self.ctx.lock_manager.lock_exclusive(&self.ctx.txn, rid) {
                return Err(StrataError::TransactionAborted(self.ctx.txn.id()));
            }

            let updated = self.generate_updated_tuple(&tuple)?;
            self.table.heap.update_tuple(rid, &updated)?;

            for index in &self.indexes {
                let old_key = tuple.key_from_tuple(&index.key_attrs);
                let new_key = updated.key_from_tuple(&index.key_attrs);
                index.index.remove(old_key, rid)?;
                index.index.insert(new_key, rid)?;
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
