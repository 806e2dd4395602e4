use thiserror::Error;

use super::types::{PageId, RecordId, TxnId};

/// Database error types
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("Tuple of {tuple_size} bytes exceeds available space {available}")]
    PageOverflow { tuple_size: usize, available: usize },

    #[error("Invalid slot ID: {0}")]
    InvalidSlotId(u16),

    #[error("Slot {0} is empty")]
    EmptySlot(u16),

    #[error("Hash directory is full, cannot split past max depth")]
    DirectoryFull,

    #[error("Record {0} not found")]
    RecordNotFound(RecordId),

    #[error("Transaction {0} is aborted")]
    TransactionAborted(TxnId),

    #[error("Table {0} already exists")]
    TableAlreadyExists(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Index {0} not found")]
    IndexNotFound(String),

    #[error("Value out of range: {0}")]
    OutOfRange(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
}

pub type Result<T> = std::result::Result<T, StrataError>;
