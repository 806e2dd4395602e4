use std::sync::Arc;

use strata::buffer::BufferPoolManager;
use strata::catalog::Catalog;
use strata::concurrency::{LockManager, TransactionManager};
use strata::execution::{
    create_executor, ComparisonOp, Expression, ExecutorContext, InsertPlan, InsertSource,
    PlanNode, SeqScanPlan,
};
use strata::storage::disk::DiskManager;
use strata::tuple::{DataType, Schema, Value};

fn main() {
    println!("Strata - storage and concurrency substrate demo");
    println!("===============================================\n");

    let db_path = "demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to open database file"));
    let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
    let catalog = Arc::new(Catalog::new(Arc::clone(&bpm)));
    let lock_manager = Arc::new(LockManager::new());
    let txn_manager = TransactionManager::new(Arc::clone(&lock_manager));
    println!("Created buffer pool with 64 frames");

    let schema = Schema::builder()
        .column("id", DataType::Integer)
        .column("name", DataType::Varchar(32))
        .build();
    let table = catalog
        .create_table("users", schema)
        .expect("failed to create table");
    catalog
        .create_index("users_id", "users", vec![0])
        .expect("failed to create index");
    println!("Created table 'users' with a hash index on id\n");

    let txn = txn_manager.begin();
    let ctx = Arc::new(ExecutorContext {
        bpm: Arc::clone(&bpm),
        catalog: Arc::clone(&catalog),
        lock_manager: Arc::clone(&lock_manager),
        txn: Arc::clone(&txn),
    });

    let rows = vec![
        vec![Value::Integer(1), Value::Varchar("ada".into())],
        vec![Value::Integer(2), Value::Varchar("grace".into())],
        vec![Value::Integer(3), Value::Varchar("edsger".into())],
    ];
    let insert = PlanNode::Insert(InsertPlan {
        table_oid: table.oid,
        source: InsertSource::Raw(rows),
    });
    let mut executor = create_executor(&ctx, &insert).expect("bad plan");
    executor.init().expect("init failed");
    let mut inserted = 0;
    while let Some((_, rid)) = executor.next().expect("insert failed") {
        println!("Inserted row at {rid}");
        inserted += 1;
    }
    println!("Inserted {inserted} rows\n");

    let scan = PlanNode::SeqScan(SeqScanPlan {
        table_oid: table.oid,
        predicate: Some(Expression::compare(
            ComparisonOp::GtEq,
            Expression::column(0),
            Expression::constant(Value::Integer(2)),
        )),
    });
    let mut executor = create_executor(&ctx, &scan).expect("bad plan");
    executor.init().expect("init failed");
    println!("Scan with predicate id >= 2:");
    while let Some((tuple, rid)) = executor.next().expect("scan failed") {
        println!("  {rid}: id={} name={}", tuple.value(0).unwrap(), tuple.value(1).unwrap());
    }

    txn_manager.commit(&txn);
    bpm.flush_all_pages().expect("flush failed");
    println!("\nCommitted and flushed");

    std::fs::remove_file(db_path).ok();
}
