//! Typed error kinds for the storage core.
//!
//! Most functions in this crate return `eyre::Result` with contextual
//! messages. The failures a caller has to react to programmatically are
//! expressed as [`StorageError`] values inside the report, recoverable via
//! `Report::downcast_ref::<StorageError>()`:
//!
//! ```ignore
//! match heap.get(rid) {
//!     Ok(bytes) => ...,
//!     Err(err) if matches!(
//!         err.downcast_ref::<StorageError>(),
//!         Some(StorageError::SlotDeleted(_))
//!     ) => ...,
//!     Err(err) => return Err(err),
//! }
//! ```
//!
//! Plain I/O failures stay downcastable as `std::io::Error`.

use thiserror::Error;

/// Failures that callers distinguish by kind rather than by message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StorageError {
    /// A record is too large to be encoded or to fit a page payload.
    #[error("record of {len} bytes does not fit a page payload")]
    DataTooLarge { len: usize },

    /// A slotted page lacks room for a record plus its directory entry.
    #[error("not enough free space on page: need {needed} bytes, have {available}")]
    NoSpace { needed: usize, available: i32 },

    /// A slot index at or past `slot_count`.
    #[error("slot {slot} out of range (slot_count={count})")]
    BadSlotId { slot: u16, count: u16 },

    /// A read of a tombstoned slot.
    #[error("slot {0} is deleted")]
    SlotDeleted(u16),

    /// The stored page checksum did not match the recomputed one.
    #[error("checksum mismatch on page {page}: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        page: u32,
        stored: u32,
        computed: u32,
    },

    /// A structural invariant was violated on disk.
    #[error("corrupt page {page}: {reason}")]
    Corruption { page: u32, reason: &'static str },

    /// A B-tree insert with a key that is already present.
    #[error("duplicate key {0}")]
    DuplicateKey(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_survives_eyre_downcast() {
        let report: eyre::Report = StorageError::DuplicateKey(42).into();
        assert_eq!(
            report.downcast_ref::<StorageError>(),
            Some(&StorageError::DuplicateKey(42))
        );
    }

    #[test]
    fn display_includes_the_interesting_numbers() {
        let err = StorageError::ChecksumMismatch {
            page: 7,
            stored: 0xDEAD_BEEF,
            computed: 0x0BAD_F00D,
        };
        let text = err.to_string();
        assert!(text.contains("page 7"));
        assert!(text.contains("0xdeadbeef"));
        assert!(text.contains("0x0badf00d"));
    }
}
