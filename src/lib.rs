//! Strata - the storage core of a disk-oriented relational engine
//!
//! This crate manages a single database file as a set of fixed-size pages,
//! caches those pages in a bounded buffer pool, and builds a B+ tree index
//! on top of the pool.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): Disk I/O and space management
//!   - `DiskManager`: Reads and writes physical pages of the database file
//!   - `DiskSpaceManager`: Maps logical page ids onto extents, each governed
//!     by a bitmap page, and allocates or frees logical pages
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferPoolManager`: Fetches pages from disk and caches them in frames
//!   - `LruReplacer` / `ClockReplacer`: Victim selection among unpinned frames
//!   - `ReadPageGuard`/`WritePageGuard`: RAII guards that hold a page latch
//!     and unpin the page when dropped
//!
//! - **Index** (`index`): A unique-key B+ tree over fixed-width keys
//!   - `BTreeIndex`: Insert, remove, point lookup and range scans
//!   - `BTreeIterator`: Ordered traversal along the leaf chain
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::buffer::{BufferPoolManager, ReplacerKind};
//! use strata::common::{BTreeConfig, PageId, RowId, SlotId};
//! use strata::index::{BTreeIndex, IntegerComparator};
//! use strata::storage::disk::DiskSpaceManager;
//!
//! let disk = Arc::new(DiskSpaceManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, ReplacerKind::Lru, disk));
//!
//! let mut index = BTreeIndex::new(
//!     bpm.clone(),
//!     Arc::new(IntegerComparator),
//!     8,
//!     &BTreeConfig::default(),
//! )
//! .unwrap();
//!
//! let row = RowId::new(PageId::new(42), SlotId::new(3));
//! index.insert(&7i64.to_le_bytes(), row).unwrap();
//! assert_eq!(index.get_value(&7i64.to_le_bytes()).unwrap(), Some(row));
//!
//! bpm.flush_all_pages().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{FrameId, PageId, Result, RowId, SlotId, StrataError};
