//! Strata - storage and concurrency substrate for a disk-oriented RDBMS
//!
//! This crate turns a page-granular disk file into a set of concurrently
//! accessible, cached, hash-indexed, lock-protected records.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): disk I/O and page organization
//!   - `DiskManager`: synchronous page reads and writes on one flat file
//!   - `HeapPage`/`TableHeap`: slotted tuple storage and the page chain
//!   - `HashDirectoryPage`/`HashBucketPage`: extendible-hash page layouts
//!
//! - **Buffer Pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: caches pages in frames behind RAII pin guards
//!   - `ClockReplacer`: second-chance eviction policy
//!   - `ParallelBufferPool`: routes page ids across independent instances
//!
//! - **Index** (`index`): `ExtendibleHashIndex` with directory growth,
//!   bucket split/merge, and an injected hash function
//!
//! - **Concurrency** (`concurrency`): record-level strict two-phase
//!   locking with wound-wait deadlock avoidance
//!
//! - **Execution** (`execution`): Volcano-style pull executors (scan,
//!   filter/aggregate/distinct/limit, joins, DML) over the layers above
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::buffer::BufferPoolManager;
//! use strata::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("strata.db").unwrap());
//! let bpm = BufferPoolManager::new(64, disk_manager);
//!
//! let page_id = {
//!     let mut guard = bpm.new_page().unwrap();
//!     guard.data_mut()[..5].copy_from_slice(b"hello");
//!     guard.page_id()
//! };
//!
//! let guard = bpm.fetch_page_read(page_id).unwrap();
//! assert_eq!(&guard.data()[..5], b"hello");
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
pub mod execution;
pub mod index;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{FrameId, PageId, RecordId, Result, SlotId, StrataError, TxnId};
