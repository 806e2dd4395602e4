use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::common::{RecordId, Result, SlotId, INVALID_PAGE_ID};
use crate::execution::executor::ValuesKey;
use crate::execution::{create_executor, Executor, ExecutorContext, HashJoinPlan};
use crate::tuple::{Schema, Tuple, Value};

/// Equi-join that hashes the right input in `init`, then streams left
/// probes, emitting one output row per matching right tuple.
pub struct HashJoinExecutor {
    plan: HashJoinPlan,
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    build_table: HashMap<ValuesKey, Vec<Tuple>>,
    pending: VecDeque<Tuple>,
}

impl HashJoinExecutor {
    pub fn new(ctx: &Arc<ExecutorContext>, plan: &HashJoinPlan) -> Result<Self> {
        Ok(Self {
            plan: plan.clone(),
            left: create_executor(ctx, &plan.left)?,
            right: create_executor(ctx, &plan.right)?,
            build_table: HashMap::new(),
            pending: VecDeque::new(),
        })
    }

    fn emit(&self, left: &Tuple, right: &Tuple) -> Result<Tuple> {
        let values: Vec<Value> = self
            .plan
            .output_exprs
            .iter()
            .map(|e| e.evaluate_join(left, right))
            .collect::<Result<_>>()?;
        Ok(Tuple::new(Arc::clone(&self.plan.output_schema), values))
    }
}

impl Executor for HashJoinExecutor {
    fn init(&mut self) -> Result<()> {
        self.build_table.clear();
        self.pending.clear();

        self.right.init()?;
        while let Some((tuple, _)) = self.right.next()? {
            let key = self.plan.right_key.evaluate(&tuple)?;
            self.build_table
                .entry(ValuesKey(vec![key]))
                .or_default()
                .push(tuple);
        }
        self.left.init()
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        loop {
            if let Some(tuple) = self.pending.pop_front() {
                return Ok(Some((
                    tuple,
                    RecordId::new(INVALID_PAGE_ID, SlotId::new(0)),
                )));
            }

            let Some((left_tuple, _)) = self.left.next()? else {
                return Ok(None);
            };
            let key = self.plan.left_key.evaluate(&left_tuple)?;
            if let Some(matches) = self.build_table.get(&ValuesKey(vec![key])) {
                for right_tuple in matches {
                    self.pending.push_back(self.emit(&left_tuple, right_tuple)?);
                }
            }
        }
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.plan.output_schema)
    }
}
