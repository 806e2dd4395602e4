//! Integration tests for the Volcano executors

use std::collections::HashSet;
use std::sync::Arc;

use strata::buffer::BufferPoolManager;
use strata::catalog::Catalog;
use strata::common::TableOid;
use strata::concurrency::{LockManager, TransactionManager};
use strata::execution::{
    create_executor, execute, AggregationPlan, AggregationType, ComparisonOp, DeletePlan,
    DistinctPlan, Executor, ExecutorContext, Expression, HashJoinPlan, InsertPlan, InsertSource,
    LimitPlan, NestedLoopJoinPlan, PlanNode, SeqScanPlan, UpdateAction, UpdatePlan,
};
use strata::storage::disk::DiskManager;
use strata::tuple::{DataType, Schema, Value};
use tempfile::NamedTempFile;

struct TestDb {
    catalog: Arc<Catalog>,
    txn_manager: TransactionManager,
    ctx: Arc<ExecutorContext>,
    _temp: NamedTempFile,
}

fn setup() -> TestDb {
    let temp = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(128, dm));
    let catalog = Arc::new(Catalog::new(Arc::clone(&bpm)));
    let lock_manager = Arc::new(LockManager::new());
    let txn_manager = TransactionManager::new(Arc::clone(&lock_manager));
    let txn = txn_manager.begin();
    let ctx = Arc::new(ExecutorContext {
        bpm,
        catalog: Arc::clone(&catalog),
        lock_manager,
        txn,
    });
    TestDb {
        catalog,
        txn_manager,
        ctx,
        _temp: temp,
    }
}

fn two_int_table(db: &TestDb, name: &str) -> TableOid {
    let schema = Schema::builder()
        .column("g", DataType::Integer)
        .column("v", DataType::Integer)
        .build();
    db.catalog.create_table(name, schema).unwrap().oid
}

fn insert_rows(db: &TestDb, oid: TableOid, rows: &[(i32, i32)]) {
    let values = rows
        .iter()
        .map(|(g, v)| vec![Value::Integer(*g), Value::Integer(*v)])
        .collect();
    let plan = PlanNode::Insert(InsertPlan {
        table_oid: oid,
        source: InsertSource::Raw(values),
    });
    let inserted = execute(&db.ctx, &plan).unwrap();
    assert_eq!(inserted.len(), rows.len());
}

fn scan_all(db: &TestDb, oid: TableOid) -> Vec<(i32, i32)> {
    let plan = PlanNode::SeqScan(SeqScanPlan {
        table_oid: oid,
        predicate: None,
    });
    execute(&db.ctx, &plan)
        .unwrap()
        .into_iter()
        .map(|t| {
            let g = match t.value(0).unwrap() {
                Value::Integer(v) => *v,
                other => panic!("unexpected value {other}"),
            };
            let v = match t.value(1).unwrap() {
                Value::Integer(v) => *v,
                other => panic!("unexpected value {other}"),
            };
            (g, v)
        })
        .collect()
}

#[test]
fn test_insert_and_seq_scan_with_predicate() {
    let db = setup();
    let oid = two_int_table(&db, "t");
    insert_rows(&db, oid, &[(1, 10), (2, 20), (3, 30), (4, 40)]);

    let plan = PlanNode::SeqScan(SeqScanPlan {
        table_oid: oid,
        predicate: Some(Expression::compare(
            ComparisonOp::Gt,
            Expression::column(1),
            Expression::constant(Value::Integer(20)),
        )),
    });
    let rows = execute(&db.ctx, &plan).unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_insert_from_child_executor() {
    let db = setup();
    let source = two_int_table(&db, "src");
    let sink = two_int_table(&db, "dst");
    insert_rows(&db, source, &[(1, 1), (2, 2)]);

    let plan = PlanNode::Insert(InsertPlan {
        table_oid: sink,
        source: InsertSource::Child(Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: source,
            predicate: None,
        }))),
    });
    execute(&db.ctx, &plan).unwrap();
    assert_eq!(scan_all(&db, sink), vec![(1, 1), (2, 2)]);
}

#[test]
fn test_insert_maintains_indexes() {
    let db = setup();
    let oid = two_int_table(&db, "t");
    db.catalog.create_index("t_g", "t", vec![0]).unwrap();

    insert_rows(&db, oid, &[(7, 70), (8, 80)]);

    let index = &db.catalog.table_indexes("t")[0];
    assert_eq!(index.index.get_value(7).unwrap().len(), 1);
    assert_eq!(index.index.get_value(8).unwrap().len(), 1);
    assert!(index.index.get_value(9).unwrap().is_empty());
}

#[test]
fn test_update_set_and_add() {
    let db = setup();
    let oid = two_int_table(&db, "t");
    db.catalog.create_index("t_v", "t", vec![1]).unwrap();
    insert_rows(&db, oid, &[(1, 10), (2, 20)]);

    let mut update_attrs = std::collections::HashMap::new();
    update_attrs.insert(1usize, UpdateAction::Add(5));
    let plan = PlanNode::Update(UpdatePlan {
        table_oid: oid,
        child: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: oid,
            predicate: None,
        })),
        update_attrs,
    });
    let rows = execute(&db.ctx, &plan).unwrap();
    assert!(rows.is_empty(), "update yields no tuples");

    assert_eq!(scan_all(&db, oid), vec![(1, 15), (2, 25)]);

    // The index follows the new key: old keys gone, new keys present.
    let index = &db.catalog.table_indexes("t")[0];
    assert!(index.index.get_value(10).unwrap().is_empty());
    assert!(index.index.get_value(20).unwrap().is_empty());
    assert_eq!(index.index.get_value(15).unwrap().len(), 1);
    assert_eq!(index.index.get_value(25).unwrap().len(), 1);

    let mut update_attrs = std::collections::HashMap::new();
    update_attrs.insert(0usize, UpdateAction::Set(9));
    let plan = PlanNode::Update(UpdatePlan {
        table_oid: oid,
        child: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: oid,
            predicate: None,
        })),
        update_attrs,
    });
    execute(&db.ctx, &plan).unwrap();
    assert_eq!(scan_all(&db, oid), vec![(9, 15), (9, 25)]);
}

#[test]
fn test_delete_removes_rows_and_index_entries() {
    let db = setup();
    let oid = two_int_table(&db, "t");
    db.catalog.create_index("t_g", "t", vec![0]).unwrap();
    insert_rows(&db, oid, &[(1, 10), (2, 20), (3, 30)]);

    let plan = PlanNode::Delete(DeletePlan {
        table_oid: oid,
        child: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: oid,
            predicate: Some(Expression::compare(
                ComparisonOp::Lt,
                Expression::column(0),
                Expression::constant(Value::Integer(3)),
            )),
        })),
    });
    execute(&db.ctx, &plan).unwrap();

    assert_eq!(scan_all(&db, oid), vec![(3, 30)]);
    let index = &db.catalog.table_indexes("t")[0];
    assert!(index.index.get_value(1).unwrap().is_empty());
    assert!(index.index.get_value(2).unwrap().is_empty());
    assert_eq!(index.index.get_value(3).unwrap().len(), 1);
}

#[test]
fn test_limit_caps_output() {
    let db = setup();
    let oid = two_int_table(&db, "t");
    insert_rows(&db, oid, &[(1, 1), (2, 2), (3, 3), (4, 4), (5, 5)]);

    let plan = PlanNode::Limit(LimitPlan {
        limit: 3,
        child: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: oid,
            predicate: None,
        })),
    });
    assert_eq!(execute(&db.ctx, &plan).unwrap().len(), 3);
}

#[test]
fn test_distinct_deduplicates() {
    let db = setup();
    let oid = two_int_table(&db, "t");
    insert_rows(&db, oid, &[(1, 1), (1, 1), (2, 2), (2, 2), (2, 2), (3, 3)]);

    let plan = PlanNode::Distinct(DistinctPlan {
        child: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: oid,
            predicate: None,
        })),
    });
    let rows = execute(&db.ctx, &plan).unwrap();
    assert_eq!(rows.len(), 3);
}

#[test]
fn test_aggregation_sum_group_by_having() {
    let db = setup();
    let oid = two_int_table(&db, "t");
    insert_rows(&db, oid, &[(1, 1), (1, 2), (2, 3), (2, 4), (3, 5)]);

    // SELECT g, SUM(v) FROM t GROUP BY g HAVING SUM(v) >= 5
    let output_schema = Schema::builder()
        .column("g", DataType::Integer)
        .column("sum_v", DataType::Integer)
        .build_arc();
    let plan = PlanNode::Aggregation(AggregationPlan {
        child: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: oid,
            predicate: None,
        })),
        group_bys: vec![Expression::column(0)],
        aggregates: vec![Expression::column(1)],
        agg_types: vec![AggregationType::Sum],
        having: Some(Expression::compare(
            ComparisonOp::GtEq,
            Expression::aggregate_ref(0),
            Expression::constant(Value::Integer(5)),
        )),
        output_exprs: vec![Expression::group_by_ref(0), Expression::aggregate_ref(0)],
        output_schema,
    });

    let rows = execute(&db.ctx, &plan).unwrap();
    let results: HashSet<(i32, i32)> = rows
        .iter()
        .map(|t| match (t.value(0).unwrap(), t.value(1).unwrap()) {
            (Value::Integer(g), Value::Integer(s)) => (*g, *s),
            other => panic!("unexpected row {other:?}"),
        })
        .collect();
    assert_eq!(results, HashSet::from([(2, 7), (3, 5)]));
}

#[test]
fn test_aggregation_count_min_max() {
    let db = setup();
    let oid = two_int_table(&db, "t");
    insert_rows(&db, oid, &[(1, 4), (1, 9), (1, 2)]);

    let output_schema = Schema::builder()
        .column("cnt", DataType::Integer)
        .column("min_v", DataType::Integer)
        .column("max_v", DataType::Integer)
        .build_arc();
    let plan = PlanNode::Aggregation(AggregationPlan {
        child: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: oid,
            predicate: None,
        })),
        group_bys: vec![],
        aggregates: vec![
            Expression::column(1),
            Expression::column(1),
            Expression::column(1),
        ],
        agg_types: vec![
            AggregationType::Count,
            AggregationType::Min,
            AggregationType::Max,
        ],
        having: None,
        output_exprs: vec![
            Expression::aggregate_ref(0),
            Expression::aggregate_ref(1),
            Expression::aggregate_ref(2),
        ],
        output_schema,
    });

    let rows = execute(&db.ctx, &plan).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value(0), Some(&Value::Integer(3)));
    assert_eq!(rows[0].value(1), Some(&Value::Integer(2)));
    assert_eq!(rows[0].value(2), Some(&Value::Integer(9)));
}

fn join_output_parts() -> (Vec<Expression>, Arc<Schema>) {
    let exprs = vec![
        Expression::join_column(0, 0),
        Expression::join_column(0, 1),
        Expression::join_column(1, 1),
    ];
    let schema = Schema::builder()
        .column("k", DataType::Integer)
        .column("lv", DataType::Integer)
        .column("rv", DataType::Integer)
        .build_arc();
    (exprs, schema)
}

#[test]
fn test_nested_loop_join() {
    let db = setup();
    let left = two_int_table(&db, "l");
    let right = two_int_table(&db, "r");
    insert_rows(&db, left, &[(1, 100), (2, 200), (3, 300)]);
    insert_rows(&db, right, &[(2, 20), (3, 30), (3, 33), (4, 40)]);

    let (output_exprs, output_schema) = join_output_parts();
    let plan = PlanNode::NestedLoopJoin(NestedLoopJoinPlan {
        left: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: left,
            predicate: None,
        })),
        right: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: right,
            predicate: None,
        })),
        predicate: Some(Expression::compare(
            ComparisonOp::Eq,
            Expression::join_column(0, 0),
            Expression::join_column(1, 0),
        )),
        output_exprs,
        output_schema,
    });

    let rows = execute(&db.ctx, &plan).unwrap();
    let results: HashSet<(i32, i32, i32)> = rows
        .iter()
        .map(|t| {
            match (
                t.value(0).unwrap(),
                t.value(1).unwrap(),
                t.value(2).unwrap(),
            ) {
                (Value::Integer(a), Value::Integer(b), Value::Integer(c)) => (*a, *b, *c),
                other => panic!("unexpected row {other:?}"),
            }
        })
        .collect();
    assert_eq!(
        results,
        HashSet::from([(2, 200, 20), (3, 300, 30), (3, 300, 33)])
    );
}

#[test]
fn test_hash_join_matches_nested_loop() {
    let db = setup();
    let left = two_int_table(&db, "l");
    let right = two_int_table(&db, "r");
    insert_rows(&db, left, &[(1, 100), (2, 200), (3, 300)]);
    insert_rows(&db, right, &[(2, 20), (3, 30), (3, 33), (4, 40)]);

    let (output_exprs, output_schema) = join_output_parts();
    let plan = PlanNode::HashJoin(HashJoinPlan {
        left: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: left,
            predicate: None,
        })),
        right: Box::new(PlanNode::SeqScan(SeqScanPlan {
            table_oid: right,
            predicate: None,
        })),
        left_key: Expression::column(0),
        right_key: Expression::column(0),
        output_exprs,
        output_schema,
    });

    let rows = execute(&db.ctx, &plan).unwrap();
    let results: HashSet<(i32, i32, i32)> = rows
        .iter()
        .map(|t| {
            match (
                t.value(0).unwrap(),
                t.value(1).unwrap(),
                t.value(2).unwrap(),
            ) {
                (Value::Integer(a), Value::Integer(b), Value::Integer(c)) => (*a, *b, *c),
                other => panic!("unexpected row {other:?}"),
            }
        })
        .collect();
    assert_eq!(
        results,
        HashSet::from([(2, 200, 20), (3, 300, 30), (3, 300, 33)])
    );
}

#[test]
fn test_dml_locks_are_held_until_commit() {
    let db = setup();
    let oid = two_int_table(&db, "t");
    insert_rows(&db, oid, &[(1, 1), (2, 2)]);

    // Every inserted record is exclusively locked by the driving txn.
    assert_eq!(db.ctx.txn.held_locks().len(), 2);

    db.txn_manager.commit(&db.ctx.txn);
    assert!(db.ctx.txn.held_locks().is_empty());
}

#[test]
fn test_executor_restart_after_init() {
    let db = setup();
    let oid = two_int_table(&db, "t");
    insert_rows(&db, oid, &[(1, 1), (2, 2)]);

    let plan = PlanNode::SeqScan(SeqScanPlan {
        table_oid: oid,
        predicate: None,
    });
    let mut executor = create_executor(&db.ctx, &plan).unwrap();

    executor.init().unwrap();
    let mut first = 0;
    while executor.next().unwrap().is_some() {
        first += 1;
    }

    // init again rewinds the scan
    executor.init().unwrap();
    let mut second = 0;
    while executor.next().unwrap().is_some() {
        second += 1;
    }
    assert_eq!(first, 2);
    assert_eq!(second, 2);
}
