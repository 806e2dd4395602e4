use std::cmp::Ordering;

use crate::common::{Result, StrataError};
use crate::tuple::{Tuple, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// Expression tree evaluated against one tuple, a joined pair of tuples,
/// or an aggregation's (group keys, aggregate values) row. Column
/// references are positional; `tuple_idx` 0 is the only/left input and 1
/// the right input of a join.
#[derive(Debug, Clone)]
pub enum Expression {
    Constant(Value),
    ColumnRef {
        tuple_idx: usize,
        col_idx: usize,
    },
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logic {
        op: LogicOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Reference into an aggregation row: a group-by key or an aggregate.
    AggregateRef {
        group_by: bool,
        idx: usize,
    },
}

impl Expression {
    pub fn constant(value: Value) -> Self {
        Expression::Constant(value)
    }

    pub fn column(col_idx: usize) -> Self {
        Expression::ColumnRef {
            tuple_idx: 0,
            col_idx,
        }
    }

    pub fn join_column(tuple_idx: usize, col_idx: usize) -> Self {
        Expression::ColumnRef { tuple_idx, col_idx }
    }

    pub fn compare(op: ComparisonOp, left: Expression, right: Expression) -> Self {
        Expression::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn logic(op: LogicOp, left: Expression, right: Expression) -> Self {
        Expression::Logic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn group_by_ref(idx: usize) -> Self {
        Expression::AggregateRef {
            group_by: true,
            idx,
        }
    }

    pub fn aggregate_ref(idx: usize) -> Self {
        Expression::AggregateRef {
            group_by: false,
            idx,
        }
    }

    /// Evaluates against a single tuple.
    pub fn evaluate(&self, tuple: &Tuple) -> Result<Value> {
        self.eval(&[tuple], None)
    }

    /// Evaluates against the two sides of a join.
    pub fn evaluate_join(&self, left: &Tuple, right: &Tuple) -> Result<Value> {
        self.eval(&[left, right], None)
    }

    /// Evaluates against an aggregation row.
    pub fn evaluate_aggregate(&self, group_bys: &[Value], aggregates: &[Value]) -> Result<Value> {
        self.eval(&[], Some((group_bys, aggregates)))
    }

    fn eval(&self, tuples: &[&Tuple], agg_row: Option<(&[Value], &[Value])>) -> Result<Value> {
        match self {
            Expression::Constant(value) => Ok(value.clone()),
            Expression::ColumnRef { tuple_idx, col_idx } => tuples
                .get(*tuple_idx)
                .and_then(|t| t.value(*col_idx))
                .cloned()
                .ok_or_else(|| {
                    StrataError::OutOfRange(format!(
                        "column reference {tuple_idx}.{col_idx} out of range"
                    ))
                }),
            Expression::Comparison { op, left, right } => {
                let lv = left.eval(tuples, agg_row)?;
                let rv = right.eval(tuples, agg_row)?;
                if lv.is_null() || rv.is_null() {
                    return Ok(Value::Boolean(false));
                }
                let ord = lv.compare(&rv)?;
                let result = match op {
                    ComparisonOp::Eq => ord == Ordering::Equal,
                    ComparisonOp::NotEq => ord != Ordering::Equal,
                    ComparisonOp::Lt => ord == Ordering::Less,
                    ComparisonOp::LtEq => ord != Ordering::Greater,
                    ComparisonOp::Gt => ord == Ordering::Greater,
                    ComparisonOp::GtEq => ord != Ordering::Less,
                };
                Ok(Value::Boolean(result))
            }
            Expression::Logic { op, left, right } => {
                let lv = left.eval(tuples, agg_row)?.as_bool();
                let rv = right.eval(tuples, agg_row)?.as_bool();
                Ok(Value::Boolean(match op {
                    LogicOp::And => lv && rv,
                    LogicOp::Or => lv || rv,
                }))
            }
            Expression::AggregateRef { group_by, idx } => {
                let (group_bys, aggregates) = agg_row.ok_or_else(|| {
                    StrataError::OutOfRange(
                        "aggregate reference outside an aggregation".to_string(),
                    )
                })?;
                let source = if *group_by { group_bys } else { aggregates };
                source.get(*idx).cloned().ok_or_else(|| {
                    StrataError::OutOfRange(format!("aggregate reference {idx} out of range"))
                })
            }
        }
    }
}
