use thiserror::Error;

use super::types::{PageId, RecordId};

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Out of disk space: every data file is at its page limit")]
    OutOfSpace,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Buffer pool exhausted, every frame is pinned")]
    BufferPoolExhausted,

    #[error("Page {0} is locked by a live write guard")]
    PageBusy(PageId),

    #[error("Invalid release of {0}: page is not pinned")]
    InvalidRelease(PageId),

    #[error("Page {0} has no free slot")]
    PageFull(PageId),

    #[error("Page size {page_size} cannot hold a single record of {record_size} bytes")]
    RelationTooSmall {
        record_size: usize,
        page_size: usize,
    },

    #[error("Value '{value}' is longer than {max} bytes")]
    ValueTooLong { value: String, max: usize },

    #[error("Value '{value}' is not a valid {expected}")]
    TypeMismatch { value: String, expected: String },

    #[error("Record has {actual} values but the schema has {expected} columns")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("Record at offset {offset} overruns a {len}-byte buffer")]
    RecordOutOfBounds { offset: usize, len: usize },

    #[error("No data page with a free slot could be obtained")]
    NoSpace,

    #[error("Invalid slot: {0}")]
    InvalidSlot(RecordId),

    #[error("Corrupt page {0}: {1}")]
    CorruptPage(PageId, String),

    #[error("Free page list error: {0}")]
    FreeList(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Table {0} already exists")]
    TableAlreadyExists(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
