//! # B-Tree Node Layouts
//!
//! Every B-tree page begins with a 16-byte node header inside the page
//! payload, followed by a kind-specific body.
//!
//! ## Node Header (payload offsets)
//!
//! ```text
//! Offset  Size  Field     Description
//! ------  ----  --------  --------------------------------------------
//! 0       1     kind      0 = meta, 1 = interior, 2 = leaf
//! 1       1     reserved
//! 2       2     count     number of keys (u16 LE)
//! 4       4     parent    unused, always 0xFFFF_FFFF (u32 LE)
//! 8       4     aux       meta: root page id; otherwise 0 (u32 LE)
//! 12      4     reserved
//! ```
//!
//! ## Leaf Body
//!
//! `count` 16-byte entries starting at offset 16, keys strictly
//! ascending:
//!
//! ```text
//! key (u64 LE) | rid.page_id (u32 LE) | rid.slot_id (u16 LE) | 2 pad
//! ```
//!
//! ## Interior Body
//!
//! A `first_child` page id (u32 LE) at offset 16, then `count` 12-byte
//! entries of `(key: u64 LE, right_child: u32 LE)`, keys strictly
//! ascending. A node with keys `k_0 < ... < k_{n-1}` and children
//! `c_0 ... c_n` routes a lookup key to the child whose key range
//! contains it: `c_i` holds keys `k` with `k_{i-1} <= k < k_i`.
//!
//! The parent field exists for format compatibility only; splits locate
//! parents through the insert descent, never through this field.

use eyre::{ensure, Result};
use zerocopy::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::StorageError;
use crate::storage::{Page, Rid, PAGE_PAYLOAD_SIZE};

/// Size of the node header at the start of every B-tree page payload.
pub const NODE_HEADER_SIZE: usize = 16;

/// Size of one leaf entry: key, rid, padding.
pub const LEAF_ENTRY_SIZE: usize = 16;

/// Size of one interior entry: key and right child.
pub const INTERIOR_ENTRY_SIZE: usize = 12;

/// Bytes reserved for the interior node's leftmost child pointer.
const INTERIOR_FIRST_CHILD_SIZE: usize = 4;

/// Maximum entries in a leaf node.
pub const LEAF_CAPACITY: usize = (PAGE_PAYLOAD_SIZE - NODE_HEADER_SIZE) / LEAF_ENTRY_SIZE;

/// Maximum separator keys in an interior node.
pub const INTERIOR_CAPACITY: usize =
    (PAGE_PAYLOAD_SIZE - NODE_HEADER_SIZE - INTERIOR_FIRST_CHILD_SIZE) / INTERIOR_ENTRY_SIZE;

/// Sentinel for "no page": the unused parent link and the root pointer
/// of a meta page mid-bootstrap.
pub const INVALID_PAGE_ID: u32 = u32::MAX;

// A split must leave at least one key on each side.
const _: () = assert!(LEAF_CAPACITY >= 2, "leaf capacity too small to split");
const _: () = assert!(INTERIOR_CAPACITY >= 2, "interior capacity too small to split");

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Meta = 0,
    Interior = 1,
    Leaf = 2,
}

impl NodeKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(NodeKind::Meta),
            1 => Some(NodeKind::Interior),
            2 => Some(NodeKind::Leaf),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NodeHeader {
    kind: u8,
    reserved0: u8,
    count: U16,
    parent: U32,
    aux: U32,
    reserved1: [u8; 4],
}

const _: () = assert!(std::mem::size_of::<NodeHeader>() == NODE_HEADER_SIZE);

impl NodeHeader {
    fn new(kind: NodeKind, count: u16, aux: u32) -> Self {
        Self {
            kind: kind as u8,
            reserved0: 0,
            count: U16::new(count),
            parent: U32::new(INVALID_PAGE_ID),
            aux: U32::new(aux),
            reserved1: [0u8; 4],
        }
    }

    /// Reads the node header from a page payload.
    pub fn parse(page: &Page) -> Result<&Self> {
        Self::ref_from_bytes(&page.payload()[..NODE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse node header: {e:?}"))
    }

    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::from_byte(self.kind)
    }

    pub fn count(&self) -> u16 {
        self.count.get()
    }

    pub fn aux(&self) -> u32 {
        self.aux.get()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, PartialEq, Eq)]
pub struct LeafEntry {
    key: U64,
    page_id: U32,
    slot_id: U16,
    pad: [u8; 2],
}

const _: () = assert!(std::mem::size_of::<LeafEntry>() == LEAF_ENTRY_SIZE);

impl LeafEntry {
    fn new(key: u64, rid: Rid) -> Self {
        Self {
            key: U64::new(key),
            page_id: U32::new(rid.page_id),
            slot_id: U16::new(rid.slot_id),
            pad: [0u8; 2],
        }
    }

    pub fn key(&self) -> u64 {
        self.key.get()
    }

    pub fn rid(&self) -> Rid {
        Rid::new(self.page_id.get(), self.slot_id.get())
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, PartialEq, Eq)]
pub struct InteriorEntry {
    key: U64,
    right_child: U32,
}

const _: () = assert!(std::mem::size_of::<InteriorEntry>() == INTERIOR_ENTRY_SIZE);

impl InteriorEntry {
    pub fn key(&self) -> u64 {
        self.key.get()
    }

    pub fn right_child(&self) -> u32 {
        self.right_child.get()
    }
}

/// Outcome of a key search within one leaf: the matching index, or the
/// index where the key would be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    Found(usize),
    NotFound(usize),
}

/// Borrowed read view of a leaf page.
#[derive(Debug)]
pub struct LeafNode<'a> {
    entries: &'a [LeafEntry],
}

impl<'a> LeafNode<'a> {
    pub fn from_page(page: &'a Page) -> Result<Self> {
        let header = NodeHeader::parse(page)?;
        if header.kind() != Some(NodeKind::Leaf) {
            return Err(StorageError::Corruption {
                page: page.id(),
                reason: "expected a leaf node",
            }
            .into());
        }
        let count = header.count() as usize;
        if count > LEAF_CAPACITY {
            return Err(StorageError::Corruption {
                page: page.id(),
                reason: "leaf entry count exceeds capacity",
            }
            .into());
        }

        let bytes = &page.payload()[NODE_HEADER_SIZE..NODE_HEADER_SIZE + count * LEAF_ENTRY_SIZE];
        let entries = <[LeafEntry]>::ref_from_bytes(bytes)
            .map_err(|e| eyre::eyre!("failed to parse leaf entries: {e:?}"))?;
        Ok(Self { entries })
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn key_at(&self, index: usize) -> u64 {
        self.entries[index].key()
    }

    pub fn rid_at(&self, index: usize) -> Rid {
        self.entries[index].rid()
    }

    /// Binary search for the first entry whose key is not below `key`.
    pub fn search(&self, key: u64) -> SearchResult {
        let pos = self.entries.partition_point(|e| e.key() < key);
        if pos < self.entries.len() && self.entries[pos].key() == key {
            SearchResult::Found(pos)
        } else {
            SearchResult::NotFound(pos)
        }
    }

    /// Decodes all entries into owned vectors for mutation.
    pub fn entries(&self) -> (Vec<u64>, Vec<Rid>) {
        let keys = self.entries.iter().map(LeafEntry::key).collect();
        let rids = self.entries.iter().map(LeafEntry::rid).collect();
        (keys, rids)
    }
}

/// Borrowed read view of an interior page.
#[derive(Debug)]
pub struct InteriorNode<'a> {
    first_child: u32,
    entries: &'a [InteriorEntry],
}

impl<'a> InteriorNode<'a> {
    pub fn from_page(page: &'a Page) -> Result<Self> {
        let header = NodeHeader::parse(page)?;
        if header.kind() != Some(NodeKind::Interior) {
            return Err(StorageError::Corruption {
                page: page.id(),
                reason: "expected an interior node",
            }
            .into());
        }
        let count = header.count() as usize;
        if count == 0 {
            return Err(StorageError::Corruption {
                page: page.id(),
                reason: "interior node has no separator keys",
            }
            .into());
        }
        if count > INTERIOR_CAPACITY {
            return Err(StorageError::Corruption {
                page: page.id(),
                reason: "interior entry count exceeds capacity",
            }
            .into());
        }

        let payload = page.payload();
        let first_child = u32::from_le_bytes([
            payload[NODE_HEADER_SIZE],
            payload[NODE_HEADER_SIZE + 1],
            payload[NODE_HEADER_SIZE + 2],
            payload[NODE_HEADER_SIZE + 3],
        ]);

        let start = NODE_HEADER_SIZE + INTERIOR_FIRST_CHILD_SIZE;
        let bytes = &payload[start..start + count * INTERIOR_ENTRY_SIZE];
        let entries = <[InteriorEntry]>::ref_from_bytes(bytes)
            .map_err(|e| eyre::eyre!("failed to parse interior entries: {e:?}"))?;
        Ok(Self {
            first_child,
            entries,
        })
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn key_at(&self, index: usize) -> u64 {
        self.entries[index].key()
    }

    /// Child `i` sits left of key `i`; child `count` is the rightmost.
    pub fn child_at(&self, index: usize) -> u32 {
        if index == 0 {
            self.first_child
        } else {
            self.entries[index - 1].right_child()
        }
    }

    /// Routes `key` to the child covering it: the child just left of the
    /// first separator strictly greater than `key`.
    pub fn find_child(&self, key: u64) -> u32 {
        let idx = self.entries.partition_point(|e| e.key() <= key);
        self.child_at(idx)
    }

    /// Decodes separator keys and all `count + 1` children for mutation.
    pub fn keys_and_children(&self) -> (Vec<u64>, Vec<u32>) {
        let keys = self.entries.iter().map(InteriorEntry::key).collect();
        let mut children = Vec::with_capacity(self.entries.len() + 1);
        children.push(self.first_child);
        children.extend(self.entries.iter().map(InteriorEntry::right_child));
        (keys, children)
    }
}

/// Encodes a meta node pointing at `root`.
pub fn write_meta(page: &mut Page, root: u32) {
    let payload = page.payload_mut();
    payload.fill(0);
    let header = NodeHeader::new(NodeKind::Meta, 0, root);
    payload[..NODE_HEADER_SIZE].copy_from_slice(header.as_bytes());
    page.cover_full_payload();
}

/// Encodes a leaf node. Keys must already be sorted and within capacity.
pub fn write_leaf(page: &mut Page, keys: &[u64], rids: &[Rid]) -> Result<()> {
    ensure!(
        keys.len() == rids.len(),
        "leaf keys/rids length mismatch: {} != {}",
        keys.len(),
        rids.len()
    );
    ensure!(
        keys.len() <= LEAF_CAPACITY,
        "leaf overflow: {} entries, capacity {}",
        keys.len(),
        LEAF_CAPACITY
    );

    let payload = page.payload_mut();
    payload.fill(0);
    let header = NodeHeader::new(NodeKind::Leaf, keys.len() as u16, 0);
    payload[..NODE_HEADER_SIZE].copy_from_slice(header.as_bytes());

    let mut offset = NODE_HEADER_SIZE;
    for (&key, &rid) in keys.iter().zip(rids) {
        let entry = LeafEntry::new(key, rid);
        payload[offset..offset + LEAF_ENTRY_SIZE].copy_from_slice(entry.as_bytes());
        offset += LEAF_ENTRY_SIZE;
    }
    page.cover_full_payload();
    Ok(())
}

/// Encodes an interior node; `children` must hold one more entry than
/// `keys`.
pub fn write_interior(page: &mut Page, keys: &[u64], children: &[u32]) -> Result<()> {
    ensure!(
        children.len() == keys.len() + 1,
        "interior children/keys mismatch: {} children for {} keys",
        children.len(),
        keys.len()
    );
    ensure!(!keys.is_empty(), "refusing to write an empty interior node");
    ensure!(
        keys.len() <= INTERIOR_CAPACITY,
        "interior overflow: {} keys, capacity {}",
        keys.len(),
        INTERIOR_CAPACITY
    );

    let payload = page.payload_mut();
    payload.fill(0);
    let header = NodeHeader::new(NodeKind::Interior, keys.len() as u16, 0);
    payload[..NODE_HEADER_SIZE].copy_from_slice(header.as_bytes());
    payload[NODE_HEADER_SIZE..NODE_HEADER_SIZE + INTERIOR_FIRST_CHILD_SIZE]
        .copy_from_slice(&children[0].to_le_bytes());

    let mut offset = NODE_HEADER_SIZE + INTERIOR_FIRST_CHILD_SIZE;
    for (&key, &right_child) in keys.iter().zip(&children[1..]) {
        let entry = InteriorEntry {
            key: U64::new(key),
            right_child: U32::new(right_child),
        };
        payload[offset..offset + INTERIOR_ENTRY_SIZE].copy_from_slice(entry.as_bytes());
        offset += INTERIOR_ENTRY_SIZE;
    }
    page.cover_full_payload();
    Ok(())
}
