//! # Slotted Page Layout
//!
//! Interprets a page payload as a slot directory over variable-length
//! records.
//!
//! ## Payload Layout
//!
//! ```text
//! +---------------------------+  payload offset 0
//! | slot_count | free_start   |  6-byte slotted header (u16 LE each)
//! | free_end   |              |
//! +---------------------------+  6
//! | record bytes, packed      |  grows forward to free_start
//! +---------------------------+  free_start
//! | free space                |
//! +---------------------------+  free_end
//! | slot directory            |  grows backward from payload end
//! | [slot n-1] ... [slot 0]   |  4 bytes each: offset (u16), length (u16)
//! +---------------------------+  4086
//! ```
//!
//! Slot `s` lives at payload offset `4086 - (s + 1) * 4`. Slot ids are
//! dense and monotonically increasing; they are never reused. Deletion is
//! lazy: the slot's length is zeroed, its offset kept, and no space is
//! reclaimed. A slot with length 0 is a tombstone, which is why callers
//! must not store zero-length records (the encoding cannot tell the two
//! apart).
//!
//! The slotted header always forces the page's `data_size` to the full
//! payload width so the checksum covers the record area and the
//! directory alike.

use eyre::Result;
use zerocopy::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::StorageError;

use super::{Page, PAGE_PAYLOAD_SIZE};

/// Size of the slotted header at the start of the payload.
pub const SLOTTED_HEADER_SIZE: usize = 6;

/// Size of one slot directory entry.
pub const SLOT_ENTRY_SIZE: usize = 4;

/// Largest record a slot entry can describe (lengths are u16).
pub const MAX_RECORD_SIZE: usize = u16::MAX as usize;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct SlottedHeader {
    slot_count: U16,
    free_start: U16,
    free_end: U16,
}

const _: () = assert!(std::mem::size_of::<SlottedHeader>() == SLOTTED_HEADER_SIZE);

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct SlotEntry {
    offset: U16,
    length: U16,
}

const _: () = assert!(std::mem::size_of::<SlotEntry>() == SLOT_ENTRY_SIZE);

/// A slotted view over one page.
///
/// The view operates purely in memory; the caller writes the page back
/// through the file layer when done.
#[derive(Debug)]
pub struct SlottedPage<'a> {
    page: &'a mut Page,
}

impl<'a> SlottedPage<'a> {
    pub fn new(page: &'a mut Page) -> Self {
        Self { page }
    }

    /// Seeds the slotted header on a freshly zeroed page and makes the
    /// checksum cover the whole payload. Idempotent.
    pub fn init_if_fresh(&mut self) {
        let (slot_count, free_start, free_end) = self.header_fields();
        if slot_count == 0 && free_start == 0 && free_end == 0 {
            self.set_header(0, SLOTTED_HEADER_SIZE as u16, PAGE_PAYLOAD_SIZE as u16);
        }
        self.page.cover_full_payload();
    }

    pub fn slot_count(&self) -> u16 {
        self.header_fields().0
    }

    /// Bytes available for one more record plus its directory entry.
    /// Negative only when the header is corrupt.
    pub fn free_space(&self) -> i32 {
        let (slot_count, free_start, free_end) = self.header_fields();
        free_end as i32 - free_start as i32 - slot_count as i32 * SLOT_ENTRY_SIZE as i32
    }

    /// Appends a record and returns its slot id.
    ///
    /// Fails with `DataTooLarge` when the record length cannot be encoded
    /// and `NoSpace` when the page lacks room for the record and its slot
    /// entry. The page is unmodified on failure.
    pub fn insert(&mut self, record: &[u8]) -> Result<u16> {
        if record.len() > MAX_RECORD_SIZE {
            return Err(StorageError::DataTooLarge { len: record.len() }.into());
        }

        let needed = record.len() + SLOT_ENTRY_SIZE;
        let available = self.free_space();
        if (available as i64) < needed as i64 {
            return Err(StorageError::NoSpace { needed, available }.into());
        }

        let (slot_count, free_start, free_end) = self.header_fields();
        let start = free_start as usize;
        self.page.payload_mut()[start..start + record.len()].copy_from_slice(record);

        let slot_id = slot_count;
        self.set_slot(slot_id, free_start, record.len() as u16);
        self.set_header(
            slot_count + 1,
            free_start + record.len() as u16,
            free_end - SLOT_ENTRY_SIZE as u16,
        );
        Ok(slot_id)
    }

    /// Returns a copy of the record bytes in `slot`.
    pub fn read(&self, slot: u16) -> Result<Vec<u8>> {
        let entry = self.slot(slot)?;
        let length = entry.length.get();
        if length == 0 {
            return Err(StorageError::SlotDeleted(slot).into());
        }

        let start = entry.offset.get() as usize;
        let end = start + length as usize;
        if end > PAGE_PAYLOAD_SIZE {
            return Err(StorageError::Corruption {
                page: self.page.id(),
                reason: "slot entry points past the payload",
            }
            .into());
        }
        Ok(self.page.payload()[start..end].to_vec())
    }

    /// Tombstones `slot`: the length is zeroed, the offset kept, and the
    /// record bytes stay in place unreclaimed.
    pub fn delete(&mut self, slot: u16) -> Result<()> {
        let entry = self.slot(slot)?;
        self.set_slot(slot, entry.offset.get(), 0);
        Ok(())
    }

    fn header_fields(&self) -> (u16, u16, u16) {
        // INVARIANT: the payload is always at least SLOTTED_HEADER_SIZE bytes.
        let header =
            SlottedHeader::ref_from_bytes(&self.page.payload()[..SLOTTED_HEADER_SIZE]).unwrap();
        (
            header.slot_count.get(),
            header.free_start.get(),
            header.free_end.get(),
        )
    }

    fn set_header(&mut self, slot_count: u16, free_start: u16, free_end: u16) {
        let header = SlottedHeader {
            slot_count: U16::new(slot_count),
            free_start: U16::new(free_start),
            free_end: U16::new(free_end),
        };
        self.page.payload_mut()[..SLOTTED_HEADER_SIZE].copy_from_slice(header.as_bytes());
        self.page.cover_full_payload();
    }

    fn slot(&self, slot: u16) -> Result<SlotEntry> {
        let count = self.slot_count();
        if slot >= count {
            return Err(StorageError::BadSlotId { slot, count }.into());
        }
        let pos = slot_position(slot);
        // INVARIANT: slot positions stay inside the payload for any u16 slot id
        // below the count that fit the directory in the first place.
        Ok(*SlotEntry::ref_from_bytes(&self.page.payload()[pos..pos + SLOT_ENTRY_SIZE]).unwrap())
    }

    fn set_slot(&mut self, slot: u16, offset: u16, length: u16) {
        let entry = SlotEntry {
            offset: U16::new(offset),
            length: U16::new(length),
        };
        let pos = slot_position(slot);
        self.page.payload_mut()[pos..pos + SLOT_ENTRY_SIZE].copy_from_slice(entry.as_bytes());
    }
}

fn slot_position(slot: u16) -> usize {
    PAGE_PAYLOAD_SIZE - (slot as usize + 1) * SLOT_ENTRY_SIZE
}
