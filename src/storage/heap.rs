//! # Heap File
//!
//! A heap file is a sequence of slotted pages at ids `0, 1, ..., N - 1`,
//! growing by one page whenever no existing page can take the incoming
//! record. There is no free-space directory: insertion scans the pages in
//! order and takes the first fit, so placement cost is linear in the file
//! size and records carry no ordering guarantee.
//!
//! Records are addressed by [`Rid`] `(page_id, slot_id)`, which stays
//! valid until the record is deleted and is never reused afterwards.
//! Deletion is lazy (the slot becomes a tombstone); reclaiming the bytes
//! would move records and invalidate rids, so this layer never compacts.

use std::path::Path;

use eyre::Result;
use tracing::{debug, trace};

use crate::error::StorageError;

use super::{Page, PageFile, Rid, SlottedPage, SyncMode, SLOT_ENTRY_SIZE};

/// Heap of variable-length records in one page file.
#[derive(Debug)]
pub struct HeapFile {
    file: PageFile,
}

impl HeapFile {
    /// Opens or creates the heap file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, SyncMode::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, sync_mode: SyncMode) -> Result<Self> {
        Ok(Self {
            file: PageFile::open_with(path, sync_mode)?,
        })
    }

    /// Number of pages currently in the file.
    pub fn page_count(&self) -> Result<u32> {
        self.file.page_count()
    }

    /// Inserts `record` into the first page with room, allocating a new
    /// page when none fits, and returns the record's rid.
    pub fn insert(&mut self, record: &[u8]) -> Result<Rid> {
        let needed = record.len() + SLOT_ENTRY_SIZE;
        let (page_id, mut page) = self.find_page_with_space(needed)?;

        let slot_id = {
            let mut slotted = SlottedPage::new(&mut page);
            slotted.insert(record)?
        };
        self.file.write_page(&page)?;

        let rid = Rid::new(page_id, slot_id);
        trace!(%rid, len = record.len(), "inserted heap record");
        Ok(rid)
    }

    /// Returns a copy of the record bytes stored at `rid`.
    pub fn get(&self, rid: Rid) -> Result<Vec<u8>> {
        let mut page = self.file.read_page(rid.page_id)?;
        SlottedPage::new(&mut page).read(rid.slot_id)
    }

    /// Tombstones the record at `rid` and writes the page back. The rid
    /// never becomes valid again.
    pub fn delete(&mut self, rid: Rid) -> Result<()> {
        let mut page = self.file.read_page(rid.page_id)?;
        SlottedPage::new(&mut page).delete(rid.slot_id)?;
        self.file.write_page(&page)
    }

    /// Visits every live record in page order, then slot order. `visit`
    /// returns `false` to stop the scan early. Tombstoned slots are
    /// skipped.
    pub fn scan(&self, mut visit: impl FnMut(Rid, &[u8]) -> bool) -> Result<()> {
        let page_count = self.file.page_count()?;
        for page_id in 0..page_count {
            let mut page = self.file.read_page(page_id)?;
            let slotted = SlottedPage::new(&mut page);
            for slot_id in 0..slotted.slot_count() {
                let record = match slotted.read(slot_id) {
                    Ok(bytes) => bytes,
                    Err(err)
                        if matches!(
                            err.downcast_ref::<StorageError>(),
                            Some(StorageError::SlotDeleted(_))
                        ) =>
                    {
                        continue
                    }
                    Err(err) => return Err(err),
                };
                if !visit(Rid::new(page_id, slot_id), &record) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Flushes the underlying file. Only needed under [`SyncMode::Off`].
    pub fn sync(&self) -> Result<()> {
        self.file.sync()
    }

    /// First-fit scan over the existing pages; falls back to a new
    /// in-memory page with the next id. Nothing is written here, so a
    /// failed insert leaves the file untouched.
    fn find_page_with_space(&self, needed: usize) -> Result<(u32, Page)> {
        let page_count = self.file.page_count()?;
        for id in 0..page_count {
            let mut page = self.file.read_page(id)?;
            let mut slotted = SlottedPage::new(&mut page);
            slotted.init_if_fresh();
            if slotted.free_space() as i64 >= needed as i64 {
                return Ok((id, page));
            }
        }

        let mut page = Page::new(page_count);
        SlottedPage::new(&mut page).init_if_fresh();
        debug!(page = page_count, "heap grows by one page");
        Ok((page_count, page))
    }
}
