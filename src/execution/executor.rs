use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::catalog::Catalog;
use crate::common::{RecordId, Result};
use crate::concurrency::{LockManager, Transaction};
use crate::tuple::{Schema, Tuple, Value};

use super::executors::{
    AggregationExecutor, DeleteExecutor, DistinctExecutor, HashJoinExecutor, InsertExecutor,
    LimitExecutor, NestedLoopJoinExecutor, SeqScanExecutor, UpdateExecutor,
};
use super::PlanNode;

/// Everything an executor needs to run: storage, catalog, and the locking
/// context of the transaction driving the pipeline.
pub struct ExecutorContext {
    pub bpm: Arc<BufferPoolManager>,
    pub catalog: Arc<Catalog>,
    pub lock_manager: Arc<LockManager>,
    pub txn: Arc<Transaction>,
}

/// Volcano iterator contract. `init` is called once before the first
/// `next` and may be called again to restart the operator; `next` pulls
/// one tuple or None when exhausted. DML executors do their work in `init`
/// or across `next` calls and stop yielding when done.
pub trait Executor {
    fn init(&mut self) -> Result<()>;
    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>>;
    fn output_schema(&self) -> Arc<Schema>;
}

/// Builds the executor tree for a plan, resolving catalog handles eagerly
/// so a bad plan fails before execution starts.
pub fn create_executor(ctx: &Arc<ExecutorContext>, plan: &PlanNode) -> Result<Box<dyn Executor>> {
    Ok(match plan {
        PlanNode::SeqScan(p) => Box::new(SeqScanExecutor::new(ctx, p)?),
        PlanNode::Insert(p) => Box::new(InsertExecutor::new(ctx, p)?),
        PlanNode::Update(p) => Box::new(UpdateExecutor::new(ctx, p)?),
        PlanNode::Delete(p) => Box::new(DeleteExecutor::new(ctx, p)?),
        PlanNode::Limit(p) => Box::new(LimitExecutor::new(ctx, p)?),
        PlanNode::Distinct(p) => Box::new(DistinctExecutor::new(ctx, p)?),
        PlanNode::Aggregation(p) => Box::new(AggregationExecutor::new(ctx, p)?),
        PlanNode::NestedLoopJoin(p) => Box::new(NestedLoopJoinExecutor::new(ctx, p)?),
        PlanNode::HashJoin(p) => Box::new(HashJoinExecutor::new(ctx, p)?),
    })
}

/// Runs a plan to completion and collects its output tuples.
pub fn execute(ctx: &Arc<ExecutorContext>, plan: &PlanNode) -> Result<Vec<Tuple>> {
    let mut executor = create_executor(ctx, plan)?;
    executor.init()?;
    let mut rows = Vec::new();
    while let Some((tuple, _)) = executor.next()? {
        rows.push(tuple);
    }
    Ok(rows)
}

/// Hashable wrapper for a row of values, keying hash-aggregation, hash
/// join, and distinct. Uses structural equality, so it only makes sense
/// for keys produced by one schema.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValuesKey(pub Vec<Value>);

impl Eq for ValuesKey {}

impl std::hash::Hash for ValuesKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for value in &self.0 {
            state.write_u64(value.hash_key());
        }
    }
}
