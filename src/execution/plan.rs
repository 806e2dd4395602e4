use std::collections::HashMap;
use std::sync::Arc;

use crate::common::TableOid;
use crate::tuple::{Schema, Value};

use super::Expression;

/// Physical plan tree consumed by the executor factory. Plans are plain
/// data; executors own the runtime state.
#[derive(Debug, Clone)]
pub enum PlanNode {
    SeqScan(SeqScanPlan),
    Insert(InsertPlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
    Limit(LimitPlan),
    Distinct(DistinctPlan),
    Aggregation(AggregationPlan),
    NestedLoopJoin(NestedLoopJoinPlan),
    HashJoin(HashJoinPlan),
}

/// Full-table scan with an optional filter predicate. Yields the table's
/// own schema.
#[derive(Debug, Clone)]
pub struct SeqScanPlan {
    pub table_oid: TableOid,
    pub predicate: Option<Expression>,
}

/// Rows to insert: literal values from the plan, or everything a child
/// produces.
#[derive(Debug, Clone)]
pub enum InsertSource {
    Raw(Vec<Vec<Value>>),
    Child(Box<PlanNode>),
}

#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub table_oid: TableOid,
    pub source: InsertSource,
}

/// Per-column update action applied to each row the child yields.
#[derive(Debug, Clone, Copy)]
pub enum UpdateAction {
    /// Replace the column with the given integer
    Set(i32),
    /// Add the given integer to the column
    Add(i32),
}

#[derive(Debug, Clone)]
pub struct UpdatePlan {
    pub table_oid: TableOid,
    pub child: Box<PlanNode>,
    pub update_attrs: HashMap<usize, UpdateAction>,
}

#[derive(Debug, Clone)]
pub struct DeletePlan {
    pub table_oid: TableOid,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct LimitPlan {
    pub limit: usize,
    pub child: Box<PlanNode>,
}

/// Drops duplicate rows of the child output (per-value equality).
#[derive(Debug, Clone)]
pub struct DistinctPlan {
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationType {
    Count,
    Sum,
    Min,
    Max,
}

/// Hash aggregation with optional HAVING. `output_exprs` build the output
/// row from the (group keys, aggregate values) pair via AggregateRef
/// expressions, as does `having`.
#[derive(Debug, Clone)]
pub struct AggregationPlan {
    pub child: Box<PlanNode>,
    pub group_bys: Vec<Expression>,
    pub aggregates: Vec<Expression>,
    pub agg_types: Vec<AggregationType>,
    pub having: Option<Expression>,
    pub output_exprs: Vec<Expression>,
    pub output_schema: Arc<Schema>,
}

/// Tuple-at-a-time join; `output_exprs` are join expressions over
/// (left, right).
#[derive(Debug, Clone)]
pub struct NestedLoopJoinPlan {
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    pub predicate: Option<Expression>,
    pub output_exprs: Vec<Expression>,
    pub output_schema: Arc<Schema>,
}

/// Equi-join that builds a hash table over the right input's key.
#[derive(Debug, Clone)]
pub struct HashJoinPlan {
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    pub left_key: Expression,
    pub right_key: Expression,
    pub output_exprs: Vec<Expression>,
    pub output_schema: Arc<Schema>,
}
