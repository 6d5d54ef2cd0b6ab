//! # Page Codec
//!
//! In-memory representation and on-disk encoding of a single 4096-byte
//! page.
//!
//! ## On-Disk Layout
//!
//! ```text
//! Offset  Size  Field       Description
//! ------  ----  ----------  -----------------------------------------
//! 0       4     page_id     u32 little-endian
//! 4       4     checksum    CRC32/IEEE over payload[..data_size]
//! 8       2     data_size   payload bytes covered by the checksum
//! 10      4086  payload
//! ```
//!
//! The checksum is computed at encode time and verified on every decode;
//! a page whose recomputed checksum differs from the stored one fails
//! with [`StorageError::ChecksumMismatch`] and never reaches the caller.
//!
//! `data_size` bounds the checksummed prefix of the payload. Raw callers
//! set it through [`Page::set_data`]; the slotted and B-tree layers force
//! it to the full payload width so the checksum covers everything they
//! touch.

use eyre::{ensure, Result};
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::StorageError;

use super::{PAGE_HEADER_SIZE, PAGE_PAYLOAD_SIZE, PAGE_SIZE};

/// The serialized page header, exactly as it appears on disk.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct DiskPageHeader {
    page_id: U32,
    checksum: U32,
    data_size: U16,
}

const _: () = assert!(std::mem::size_of::<DiskPageHeader>() == PAGE_HEADER_SIZE);

impl DiskPageHeader {
    pub fn page_id(&self) -> u32 {
        self.page_id.get()
    }

    pub fn checksum(&self) -> u32 {
        self.checksum.get()
    }

    pub fn data_size(&self) -> u16 {
        self.data_size.get()
    }
}

/// An owned in-memory page.
///
/// A `Page` is always a private copy: decoding a disk image copies the
/// payload, and callers never observe a buffer shared with the file
/// layer.
#[derive(Clone)]
pub struct Page {
    id: u32,
    data_size: u16,
    payload: Box<[u8; PAGE_PAYLOAD_SIZE]>,
}

impl Page {
    /// Creates a zeroed page with the given id.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            data_size: 0,
            payload: Box::new([0u8; PAGE_PAYLOAD_SIZE]),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn data_size(&self) -> u16 {
        self.data_size
    }

    /// The checksummed prefix of the payload.
    pub fn data(&self) -> &[u8] {
        &self.payload[..self.data_size as usize]
    }

    /// The full payload region, independent of `data_size`.
    pub fn payload(&self) -> &[u8] {
        &self.payload[..]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload[..]
    }

    /// Replaces the page contents with `bytes` and zeroes the remainder
    /// of the payload.
    ///
    /// Fails with [`StorageError::DataTooLarge`] when `bytes` exceeds the
    /// payload width; the page is left unmodified in that case.
    pub fn set_data(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > PAGE_PAYLOAD_SIZE {
            return Err(StorageError::DataTooLarge { len: bytes.len() }.into());
        }
        self.payload[..bytes.len()].copy_from_slice(bytes);
        self.payload[bytes.len()..].fill(0);
        self.data_size = bytes.len() as u16;
        Ok(())
    }

    /// Extends the checksum coverage to the whole payload. Used by the
    /// slotted and B-tree layers, which own the full payload region.
    pub(crate) fn cover_full_payload(&mut self) {
        self.data_size = PAGE_PAYLOAD_SIZE as u16;
    }

    /// CRC32/IEEE over the first `data_size` payload bytes.
    pub fn checksum(&self) -> u32 {
        crc32fast::hash(self.data())
    }

    /// Serializes the page into a 4096-byte disk image, computing the
    /// checksum over the covered payload prefix.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<()> {
        ensure!(
            buf.len() == PAGE_SIZE,
            "encode buffer is {} bytes, expected {}",
            buf.len(),
            PAGE_SIZE
        );

        let header = DiskPageHeader {
            page_id: U32::new(self.id),
            checksum: U32::new(self.checksum()),
            data_size: U16::new(self.data_size),
        };
        buf[..PAGE_HEADER_SIZE].copy_from_slice(header.as_bytes());
        buf[PAGE_HEADER_SIZE..].copy_from_slice(&self.payload[..]);
        Ok(())
    }

    /// Reconstructs a page from a 4096-byte disk image, verifying the
    /// stored checksum against the payload.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        ensure!(
            buf.len() == PAGE_SIZE,
            "decode buffer is {} bytes, expected {}",
            buf.len(),
            PAGE_SIZE
        );

        let header = DiskPageHeader::ref_from_bytes(&buf[..PAGE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse page header: {e:?}"))?;

        let id = header.page_id();
        let data_size = header.data_size();
        if data_size as usize > PAGE_PAYLOAD_SIZE {
            return Err(StorageError::Corruption {
                page: id,
                reason: "data_size exceeds page payload",
            }
            .into());
        }

        let mut payload = Box::new([0u8; PAGE_PAYLOAD_SIZE]);
        payload.copy_from_slice(&buf[PAGE_HEADER_SIZE..]);

        let computed = crc32fast::hash(&payload[..data_size as usize]);
        let stored = header.checksum();
        if computed != stored {
            return Err(StorageError::ChecksumMismatch {
                page: id,
                stored,
                computed,
            }
            .into());
        }

        Ok(Self {
            id,
            data_size,
            payload,
        })
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.id)
            .field("data_size", &self.data_size)
            .finish_non_exhaustive()
    }
}
