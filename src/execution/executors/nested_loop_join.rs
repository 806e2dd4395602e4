use std::sync::Arc;

use crate::common::{RecordId, Result, SlotId, INVALID_PAGE_ID};
use crate::execution::{
    create_executor, Executor, ExecutorContext, NestedLoopJoinPlan,
};
use crate::tuple::{Schema, Tuple, Value};

/// Tuple-at-a-time nested loop join: for the current left tuple, pull
/// right tuples until exhaustion, then restart the right side and advance
/// the left.
pub struct NestedLoopJoinExecutor {
    plan: NestedLoopJoinPlan,
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    current_left: Option<Tuple>,
}

impl NestedLoopJoinExecutor {
    pub fn new(ctx: &Arc<ExecutorContext>, plan: &NestedLoopJoinPlan) -> Result<Self> {
        Ok(Self {
            plan: plan.clone(),
            left: create_executor(ctx, &plan.left)?,
            right: create_executor(ctx, &plan.right)?,
            current_left: None,
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

impl Executor for NestedLoopJoinExecutor {
    fn init(&mut self) -> Result<()> {
        self.left.init()?;
        self.right.init()?;
        self.current_left = self.left.next()?.map(|(t, _)| t);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        loop {
            let Some(left_tuple) = self.current_left.clone() else {
                return Ok(None);
            };

            if let Some((right_tuple, _)) = self.right.next()? {
                let matched = match &self.plan.predicate {
                    None => true,
                    Some(p) => p.evaluate_join(&left_tuple, &right_tuple)?.as_bool(),
                };
                if matched {
                    let tuple = self.emit(&left_tuple, &right_tuple)?;
                    return Ok(Some((
                        tuple,
                        RecordId::new(INVALID_PAGE_ID, SlotId::new(0)),
                    )));
                }
            } else {
                // Right side exhausted for this left tuple: rewind it and
                // move on.
                self.current_left = self.left.next()?.map(|(t, _)| t);
                self.right.init()?;
            }
        }
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.plan.output_schema)
    }
}
