use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result, SlotId, StrataError, INVALID_PAGE_ID};
use crate::storage::page::{HeapPage, HeapPageRef};
use crate::tuple::{Schema, Tuple};

/// TableHeap is an unordered collection of tuples stored in a singly linked
/// chain of heap pages. Inserts go to the tail page, growing the chain when
/// the tail is full; deletes are tombstones, so record ids are stable for
/// the life of the table.
pub struct TableHeap {
    bpm: Arc<BufferPoolManager>,
    first_page_id: PageId,
    /// Tail hint; inserts serialize on it so the chain is grown only once.
    last_page_id: Mutex<PageId>,
}

impl TableHeap {
    /// Creates an empty heap with one allocated page.
    pub fn new(bpm: Arc<BufferPoolManager>) -> Result<Self> {
        let first_page_id = {
            let mut guard = bpm.new_page()?;
            let mut page = HeapPage::new(guard.data_mut());
            page.init();
            guard.page_id()
        };
        Ok(Self {
            bpm,
            first_page_id,
            last_page_id: Mutex::new(first_page_id),
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Appends a tuple, growing the page chain when the tail is full.
    pub fn insert_tuple(&self, tuple: &Tuple) -> Result<RecordId> {
        let encoded = tuple.to_bytes()?;
        let mut last = self.last_page_id.lock();

        {
            let mut guard = self.bpm.fetch_page_write(*last)?;
            let mut page = HeapPage::new(guard.data_mut());
            if page.can_insert(encoded.len()) {
                let slot = page.insert_tuple(&encoded)?;
                return Ok(RecordId::new(*last, slot));
            }
        }

        // Tail is full: allocate and link a fresh page.
        let mut new_guard = self.bpm.new_page()?;
        let new_page_id = new_guard.page_id();
        let mut new_page = HeapPage::new(new_guard.data_mut());
        new_page.init();
        if !new_page.can_insert(encoded.len()) {
            return Err(StrataError::PageOverflow {
                tuple_size: encoded.len(),
                available: new_page.free_space(),
            });
        }
        let slot = new_page.insert_tuple(&encoded)?;
        drop(new_guard);

        {
            let mut tail_guard = self.bpm.fetch_page_write(*last)?;
            let mut tail = HeapPage::new(tail_guard.data_mut());
            tail.set_next_page_id(new_page_id);
        }

        *last = new_page_id;
        Ok(RecordId::new(new_page_id, slot))
    }

    /// Fetches a live tuple by record id.
    pub fn get_tuple(&self, rid: RecordId, schema: &Arc<Schema>) -> Result<Tuple> {
        let guard = self.bpm.fetch_page_read(rid.page_id)?;
        let page = HeapPageRef::new(guard.data());
        let bytes = page.get_tuple(rid.slot_id)?;
        Tuple::from_bytes(Arc::clone(schema), bytes)
    }

    /// Overwrites a tuple in place. The new encoding must fit the slot.
    pub fn update_tuple(&self, rid: RecordId, tuple: &Tuple) -> Result<()> {
        let encoded = tuple.to_bytes()?;
        let mut guard = self.bpm.fetch_page_write(rid.page_id)?;
        let mut page = HeapPage::new(guard.data_mut());
        page.update_tuple(rid.slot_id, &encoded)
    }

    /// Tombstones a tuple.
    pub fn mark_delete(&self, rid: RecordId) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(rid.page_id)?;
        let mut page = HeapPage::new(guard.data_mut());
        page.mark_delete(rid.slot_id)
    }

    /// Iterates every live tuple in record-id order.
    pub fn iter(&self, schema: Arc<Schema>) -> TableIterator {
        TableIterator {
            bpm: Arc::clone(&self.bpm),
            schema,
            current_page: self.first_page_id,
            current_slot: 0,
        }
    }
}

/// Pull-based cursor over a table heap's page chain, skipping tombstones.
pub struct TableIterator {
    bpm: Arc<BufferPoolManager>,
    schema: Arc<Schema>,
    current_page: PageId,
    current_slot: u16,
}

impl Iterator for TableIterator {
    type Item = Result<(Tuple, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_page == INVALID_PAGE_ID {
                return None;
            }

            let guard = match self.bpm.fetch_page_read(self.current_page) {
                Ok(g) => g,
                Err(e) => return Some(Err(e)),
            };
            let page = HeapPageRef::new(guard.data());

            while self.current_slot < page.num_slots() {
                let slot = SlotId::new(self.current_slot);
                self.current_slot += 1;
                if page.is_live(slot) {
                    let rid = RecordId::new(self.current_page, slot);
                    let item = page
                        .get_tuple(slot)
                        .and_then(|bytes| Tuple::from_bytes(Arc::clone(&self.schema), bytes))
                        .map(|tuple| (tuple, rid));
                    return Some(item);
                }
            }

            self.current_page = page.next_page_id();
            self.current_slot = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::DiskManager;
    use crate::tuple::{DataType, Value};
    use tempfile::NamedTempFile;

    fn setup() -> (Arc<BufferPoolManager>, Arc<Schema>, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(16, dm));
        let schema = Schema::builder()
            .column("id", DataType::Integer)
            .column("name", DataType::Varchar(64))
            .build_arc();
        (bpm, schema, temp_file)
    }

    fn row(schema: &Arc<Schema>, id: i32, name: &str) -> Tuple {
        Tuple::new(
            Arc::clone(schema),
            vec![Value::Integer(id), Value::Varchar(name.to_string())],
        )
    }

    #[test]
    fn test_table_heap_insert_get() {
        let (bpm, schema, _temp) = setup();
        let heap = TableHeap::new(bpm).unwrap();

        let rid = heap.insert_tuple(&row(&schema, 1, "ada")).unwrap();
        let tuple = heap.get_tuple(rid, &schema).unwrap();
        assert_eq!(tuple.value(0), Some(&Value::Integer(1)));
        assert_eq!(tuple.value(1), Some(&Value::Varchar("ada".into())));
    }

    #[test]
    fn test_table_heap_update_delete() {
        let (bpm, schema, _temp) = setup();
        let heap = TableHeap::new(bpm).unwrap();

        let rid = heap.insert_tuple(&row(&schema, 1, "ada")).unwrap();
        heap.update_tuple(rid, &row(&schema, 2, "bob")).unwrap();
        let tuple = heap.get_tuple(rid, &schema).unwrap();
        assert_eq!(tuple.value(0), Some(&Value::Integer(2)));

        heap.mark_delete(rid).unwrap();
        assert!(heap.get_tuple(rid, &schema).is_err());
    }

    #[test]
    fn test_table_heap_spans_pages() {
        let (bpm, schema, _temp) = setup();
        let heap = TableHeap::new(bpm).unwrap();

        let long_name = "x".repeat(60);
        let mut rids = Vec::new();
        for i in 0..300 {
            rids.push(heap.insert_tuple(&row(&schema, i, &long_name)).unwrap());
        }

        let pages: std::collections::HashSet<_> = rids.iter().map(|r| r.page_id).collect();
        assert!(pages.len() > 1, "300 wide rows must overflow one page");

        let mut seen = 0;
        for (i, item) in heap.iter(Arc::clone(&schema)).enumerate() {
            let (tuple, rid) = item.unwrap();
            assert_eq!(tuple.value(0), Some(&Value::Integer(i as i32)));
            assert_eq!(rid, rids[i]);
            seen += 1;
        }
        assert_eq!(seen, 300);
    }

    #[test]
    fn test_table_heap_iter_skips_tombstones() {
        let (bpm, schema, _temp) = setup();
        let heap = TableHeap::new(bpm).unwrap();

        let mut rids = Vec::new();
        for i in 0..10 {
            rids.push(heap.insert_tuple(&row(&schema, i, "r")).unwrap());
        }
        for rid in rids.iter().step_by(2) {
            heap.mark_delete(*rid).unwrap();
        }

        let ids: Vec<i32> = heap
            .iter(schema)
            .map(|item| match item.unwrap().0.value(0) {
                Some(Value::Integer(v)) => *v,
                _ => panic!("bad value"),
            })
            .collect();
        assert_eq!(ids, vec![1, 3, 5, 7, 9]);
    }
}
