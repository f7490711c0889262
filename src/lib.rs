//! heapdb - a small paged storage engine with heap-file relations
//!
//! The engine keeps table data in fixed-size pages spread over a handful of
//! data files, caches them in a buffer pool, and stores fixed-width records
//! in heap files made of linked data pages.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//!
//! - **Storage Layer** (`storage`): Handles disk I/O and page organization
//!   - `DiskManager`: Allocates, reads, writes and frees pages in `Data{i}.bin` files
//!   - `HeaderPage`: Per-relation page holding the heads of its page lists
//!   - `DataPage`: Slot bitmap plus fixed-size record area, linked prev/next
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferManager`: Fetches pages from disk and caches them in memory
//!   - `ReplacementPolicy`: LRU or MRU victim selection
//!   - `FrameHeader`: Per-frame metadata and data storage
//!   - `ReadPageGuard`/`WritePageGuard`: RAII guards that unpin on drop
//!
//! - **Records** (`tuple`): Column types and the fixed-width record codec
//!
//! - **Heap Files** (`heap`): `Relation`, a table stored as full and not-full
//!   lists of data pages
//!
//! - **Catalog** (`catalog`): The set of relations, persisted in `database.save`
//!
//! - **Shell** (`shell`): Parses and runs `CREATE TABLE`, `DROP`, `DESCRIBE`
//!   and `EXIT` commands
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use heapdb::buffer::BufferManager;
//! use heapdb::common::DbConfig;
//! use heapdb::heap::Relation;
//! use heapdb::storage::disk::DiskManager;
//! use heapdb::tuple::{ColumnInfo, ColumnType};
//!
//! let config = DbConfig::new("./DB").with_page_size(4096).with_buffer_count(8);
//! let dm = Arc::new(DiskManager::new(&config));
//! dm.init().unwrap();
//! let bm = Arc::new(BufferManager::from_config(&config, Arc::clone(&dm)));
//!
//! let columns = vec![
//!     ColumnInfo::new("Id", ColumnType::Int),
//!     ColumnInfo::new("Name", ColumnType::VarChar(20)),
//! ];
//! let people = Relation::create("People", columns, Arc::clone(&dm), Arc::clone(&bm)).unwrap();
//!
//! let rid = people.insert_record(&["1", "Ada"]).unwrap();
//! assert_eq!(people.get_all_records().unwrap(), vec![vec!["1", "Ada"]]);
//! people.delete_record(rid).unwrap();
//!
//! bm.flush_all().unwrap();
//! dm.finish().unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod heap;
pub mod shell;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{DbError, PageId, RecordId, Result};
