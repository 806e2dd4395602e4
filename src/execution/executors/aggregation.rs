use std::collections::HashMap;
use std::sync::Arc;

use crate::common::{RecordId, Result, SlotId, INVALID_PAGE_ID};
use crate::execution::executor::ValuesKey;
use crate::execution::{
    create_executor, AggregationPlan, AggregationType, Executor, ExecutorContext,
};
use crate::tuple::{Schema, Tuple, Value};

/// Hash aggregation. Pass 1 (`init`) folds every child tuple into a
/// group-key -> running-state table and drops groups failing HAVING; pass
/// 2 (`next`) materializes one output row per surviving group through the
/// plan's output expressions.
pub struct AggregationExecutor {
    plan: AggregationPlan,
    child: Box<dyn Executor>,
    groups: Vec<(Vec<Value>, Vec<Value>)>,
    cursor: usize,
}

impl AggregationExecutor {
    pub fn new(ctx: &Arc<ExecutorContext>, plan: &AggregationPlan) -> Result<Self> {
        Ok(Self {
            plan: plan.clone(),
            child: create_executor(ctx, &plan.child)?,
            groups: Vec::new(),
            cursor: 0,
        })
    }

    /// Folds one input into a running aggregate. Count counts rows; Sum,
    /// Min and Max ignore null inputs and start from the first non-null.
    fn combine(acc: &Value, input: &Value, agg_type: AggregationType) -> Result<Value> {
        match agg_type {
            AggregationType::Count => acc.add(&Value::Integer(1)),
            AggregationType::Sum => {
                if input.is_null() {
                    Ok(acc.clone())
                } else if acc.is_null() {
                    Ok(input.clone())
                } else {
                    acc.add(input)
                }
            }
            AggregationType::Min => {
                if input.is_null() || (!acc.is_null() && acc.compare(input)?.is_le()) {
                    Ok(acc.clone())
                } else {
                    Ok(input.clone())
                }
            }
            AggregationType::Max => {
                if input.is_null() || (!acc.is_null() && acc.compare(input)?.is_ge()) {
                    Ok(acc.clone())
                } else {
                    Ok(input.clone())
                }
            }
        }
    }

    fn initial_state(&self) -> Vec<Value> {
        self.plan
            .agg_types
            .iter()
            .map(|t| match t {
                AggregationType::Count => Value::Integer(0),
                _ => Value::Null,
            })
            .collect()
    }
}

impl Executor for AggregationExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()?;
        self.groups.clear();
        self.cursor = 0;

        let mut table: HashMap<ValuesKey, Vec<Value>> = HashMap::new();
        while let Some((tuple, _)) = self.child.next()? {
            let key: Vec<Value> = self
                .plan
                .group_bys
                .iter()
                .map(|e| e.evaluate(&tuple))
                .collect::<Result<_>>()?;
            let inputs: Vec<Value> = self
                .plan
                .aggregates
                .iter()
                .map(|e| e.evaluate(&tuple))
                .collect::<Result<_>>()?;

            let state = table
                .entry(ValuesKey(key))
                .or_insert_with(|| self.initial_state());
            for (i, input) in inputs.iter().enumerate() {
                state[i] = Self::combine(&state[i], input, self.plan.agg_types[i])?;
            }
        }

        for (key, state) in table {
            let keep = match &self.plan.having {
                None => true,
                Some(having) => having.evaluate_aggregate(&key.0, &state)?.as_bool(),
            };
            if keep {
                self.groups.push((key.0, state));
            }
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if self.cursor >= self.groups.len() {
            return Ok(None);
        }
        let (group_bys, aggregates) = &self.groups[self.cursor];
        self.cursor += 1;

        let values: Vec<Value> = self
            .plan
            .output_exprs
            .iter()
            .map(|e| e.evaluate_aggregate(group_bys, aggregates))
            .collect::<Result<_>>()?;
        let tuple = Tuple::new(Arc::clone(&self.plan.output_schema), values);
        Ok(Some((
            tuple,
            RecordId::new(INVALID_PAGE_ID, SlotId::new(0)),
        )))
    }

    fn output_schema(&self) -> Arc<Schema> {
        Arc::clone(&self.plan.output_schema)
    }
}
