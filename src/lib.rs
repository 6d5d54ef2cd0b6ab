//! # DuskDB Storage Core
//!
//! The storage engine of an embedded, single-process database: durable,
//! integrity-checked persistence of variable-length records in a heap
//! file, and a disk-resident B-tree index mapping `u64` keys to record
//! locations.
//!
//! ## Architecture
//!
//! ```text
//! +---------------------+      +---------------------+
//! |  HeapFile           |      |  BTree              |
//! |  insert/get/delete/ |      |  insert/get         |
//! |  scan by RID        |      |  key -> RID         |
//! +---------------------+      +---------------------+
//! |  SlottedPage        |      |  node layouts       |
//! +---------------------+      +---------------------+
//! |        Page codec + PageFile (shared)            |
//! |  4096-byte pages, CRC32 checksums, fsync         |
//! +--------------------------------------------------+
//! ```
//!
//! The heap and the index are independent files that share only the page
//! codec. A typical caller inserts record bytes into the heap, receives a
//! [`Rid`], and registers `(key, rid)` in the index; lookups run key →
//! B-tree → rid → heap → bytes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use duskdb::{BTree, HeapFile};
//!
//! # fn main() -> eyre::Result<()> {
//! let mut heap = HeapFile::open("records.dsk")?;
//! let mut index = BTree::open("records.idx")?;
//!
//! let rid = heap.insert(b"first record")?;
//! index.insert(1, rid)?;
//!
//! if let Some(rid) = index.get(1)? {
//!     let bytes = heap.get(rid)?;
//!     assert_eq!(bytes, b"first record");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees and Limits
//!
//! Every page carries a CRC32 checksum verified on read; a page that
//! fails verification never reaches the caller. Writes are durable per
//! page under the default [`storage::SyncMode::Full`]. There is no
//! write-ahead log: a crash between the pages of one split can leave the
//! index needing external repair. One writer at a time; no internal
//! locking, caching, compaction, or key deletion.

pub mod btree;
pub mod error;
pub mod storage;

pub use btree::BTree;
pub use error::StorageError;
pub use storage::{HeapFile, Page, PageFile, Rid, SyncMode};
