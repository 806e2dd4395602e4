use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::BufferPoolManager;
use crate::common::{IndexOid, Result, StrataError, TableOid};
use crate::index::{DefaultKeyHasher, ExtendibleHashIndex};
use crate::storage::TableHeap;
use crate::tuple::Schema;

/// A registered table: its heap and schema.
pub struct TableInfo {
    pub oid: TableOid,
    pub name: String,
    pub schema: Arc<Schema>,
    pub heap: Arc<TableHeap>,
}

/// A registered index: which table columns it keys on and the hash index
/// holding the entries.
pub struct IndexInfo {
    pub oid: IndexOid,
    pub name: String,
    pub table_name: String,
    pub key_attrs: Vec<usize>,
    pub key_schema: Arc<Schema>,
    pub index: ExtendibleHashIndex,
}

#[derive(Default)]
struct CatalogInner {
    tables: HashMap<TableOid, Arc<TableInfo>>,
    table_names: HashMap<String, TableOid>,
    indexes: HashMap<IndexOid, Arc<IndexInfo>>,
    /// table name -> index name -> oid
    index_names: HashMap<String, HashMap<String, IndexOid>>,
    next_table_oid: TableOid,
    next_index_oid: IndexOid,
}

/// In-memory registry of tables and indexes. Executors resolve their
/// table and index handles here.
pub struct Catalog {
    bpm: Arc<BufferPoolManager>,
    inner: Mutex<CatalogInner>,
}

impl Catalog {
    pub fn new(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            inner: Mutex::new(CatalogInner::default()),
        }
    }

    pub fn create_table(&self, name: &str, schema: Schema) -> Result<Arc<TableInfo>> {
        let heap = Arc::new(TableHeap::new(Arc::clone(&self.bpm))?);

        let mut inner = self.inner.lock();
        if inner.table_names.contains_key(name) {
            return Err(StrataError::TableAlreadyExists(name.to_string()));
        }
        let oid = inner.next_table_oid;
        inner.next_table_oid += 1;

        let info = Arc::new(TableInfo {
            oid,
            name: name.to_string(),
            schema: Arc::new(schema),
            heap,
        });
        inner.tables.insert(oid, Arc::clone(&info));
        inner.table_names.insert(name.to_string(), oid);
        Ok(info)
    }

    pub fn table(&self, oid: TableOid) -> Option<Arc<TableInfo>> {
        self.inner.lock().tables.get(&oid).cloned()
    }

    pub fn table_by_name(&self, name: &str) -> Option<Arc<TableInfo>> {
        let inner = self.inner.lock();
        let oid = inner.table_names.get(name)?;
        inner.tables.get(oid).cloned()
    }

    /// Creates a hash index over the given key columns and backfills it
    /// from the table's current contents.
    pub fn create_index(
        &self,
        index_name: &str,
        table_name: &str,
        key_attrs: Vec<usize>,
    ) -> Result<Arc<IndexInfo>> {
        let table = self
            .table_by_name(table_name)
            .ok_or_else(|| StrataError::TableNotFound(table_name.to_string()))?;
        let key_schema = table
            .schema
            .project(&key_attrs)
            .ok_or_else(|| StrataError::OutOfRange("index key column out of range".into()))?;

        let index =
            ExtendibleHashIndex::new(Arc::clone(&self.bpm), Box::new(DefaultKeyHasher))?;
        for item in table.heap.iter(Arc::clone(&table.schema)) {
            let (tuple, rid) = item?;
            index.insert(tuple.key_from_tuple(&key_attrs), rid)?;
        }

        let mut inner = self.inner.lock();
        let oid = inner.next_index_oid;
        inner.next_index_oid += 1;

        let info = Arc::new(IndexInfo {
            oid,
            name: index_name.to_string(),
            table_name: table_name.to_string(),
            key_attrs,
            key_schema: Arc::new(key_schema),
            index,
        });
        inner.indexes.insert(oid, Arc::clone(&info));
        inner
            .index_names
            .entry(table_name.to_string())
            .or_default()
            .insert(index_name.to_string(), oid);
        Ok(info)
    }

    pub fn index(&self, oid: IndexOid) -> Option<Arc<IndexInfo>> {
        self.inner.lock().indexes.get(&oid).cloned()
    }

    /// Every index registered on the table, for DML maintenance.
    pub fn table_indexes(&self, table_name: &str) -> Vec<Arc<IndexInfo>> {
        let inner = self.inner.lock();
        inner
            .index_names
            .get(table_name)
            .map(|by_name| {
                by_name
                    .values()
                    .filter_map(|oid| inner.indexes.get(oid).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}
