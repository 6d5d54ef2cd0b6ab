//! # On-Disk B-Tree
//!
//! An ordered map from `u64` keys to heap record ids, stored in its own
//! page file. Page 0 is the meta node holding the current root page id;
//! every other page is an interior or leaf node.
//!
//! ## Descent
//!
//! Lookups walk from the root, routing through interior separators until
//! a leaf answers. Separators equal the smallest key of their right
//! subtree, so interior routing takes the first child whose separator is
//! strictly greater than the search key while leaf search matches on
//! "first key not below".
//!
//! ## Insert and Splits
//!
//! Inserts descend to the unique responsible leaf, remembering the
//! interior pages they pass. An overflowing leaf splits in half and
//! promotes the right half's first key; an overflowing interior node
//! promotes its middle key, which the right half does not keep. When the
//! promotion reaches a split root, a fresh root is written and the meta
//! page is repointed, growing the tree by one level.
//!
//! Within one split the write order is left half, right half, then the
//! parent; a new root is written before the meta page. Crash atomicity
//! across those writes is out of scope for this layer.
//!
//! ## What This Tree Does Not Do
//!
//! No deletes, no rebalancing, no page reuse: allocation always appends
//! the next page id. Keys are unique; a second insert of the same key
//! fails with `DuplicateKey` and changes nothing.

use std::path::Path;

use eyre::Result;
use smallvec::SmallVec;
use tracing::debug;

use crate::error::StorageError;
use crate::storage::{Page, PageFile, Rid, SyncMode};

use super::node::{
    self, InteriorNode, LeafNode, NodeHeader, NodeKind, SearchResult, INTERIOR_CAPACITY,
    INVALID_PAGE_ID, LEAF_CAPACITY,
};

/// The meta node always occupies page 0 of the index file.
pub const META_PAGE_ID: u32 = 0;

/// Expected depth bound for the descent stack; trees deeper than this
/// spill to the heap, they do not fail.
const EXPECTED_MAX_DEPTH: usize = 8;

/// A disk-resident B-tree index.
#[derive(Debug)]
pub struct BTree {
    file: PageFile,
    root_page: u32,
}

impl BTree {
    /// Opens the index file at `path`, bootstrapping an empty tree when
    /// the file is empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, SyncMode::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, sync_mode: SyncMode) -> Result<Self> {
        let file = PageFile::open_with(path, sync_mode)?;

        if file.page_count()? == 0 {
            // Meta first with no root, then the empty root leaf, then the
            // meta again pointing at it.
            let mut meta = Page::new(META_PAGE_ID);
            node::write_meta(&mut meta, INVALID_PAGE_ID);
            file.write_page(&meta)?;

            let mut root = Page::new(1);
            node::write_leaf(&mut root, &[], &[])?;
            file.write_page(&root)?;

            node::write_meta(&mut meta, 1);
            file.write_page(&meta)?;

            debug!(root = 1, "bootstrapped empty tree");
            return Ok(Self { file, root_page: 1 });
        }

        let meta = file.read_page(META_PAGE_ID)?;
        let header = NodeHeader::parse(&meta)?;
        if header.kind() != Some(NodeKind::Meta) {
            return Err(StorageError::Corruption {
                page: META_PAGE_ID,
                reason: "page 0 is not a meta node",
            }
            .into());
        }

        let root_page = header.aux();
        if root_page == INVALID_PAGE_ID || root_page >= file.page_count()? {
            return Err(StorageError::Corruption {
                page: META_PAGE_ID,
                reason: "meta node points at an invalid root",
            }
            .into());
        }

        Ok(Self { file, root_page })
    }

    pub fn root_page(&self) -> u32 {
        self.root_page
    }

    /// Point lookup. Absence is `None`, not an error.
    pub fn get(&self, key: u64) -> Result<Option<Rid>> {
        let mut current = self.root_page;
        loop {
            let page = self.file.read_page(current)?;
            let kind = NodeHeader::parse(&page)?.kind();
            match kind {
                Some(NodeKind::Leaf) => {
                    let leaf = LeafNode::from_page(&page)?;
                    return Ok(match leaf.search(key) {
                        SearchResult::Found(index) => Some(leaf.rid_at(index)),
                        SearchResult::NotFound(_) => None,
                    });
                }
                Some(NodeKind::Interior) => {
                    current = InteriorNode::from_page(&page)?.find_child(key);
                }
                _ => {
                    return Err(StorageError::Corruption {
                        page: current,
                        reason: "unexpected node kind during descent",
                    }
                    .into())
                }
            }
        }
    }

    /// Inserts a unique `key -> rid` mapping, splitting nodes as needed.
    ///
    /// Fails with [`StorageError::DuplicateKey`] when the key is already
    /// present; the tree is unchanged in that case.
    pub fn insert(&mut self, key: u64, rid: Rid) -> Result<()> {
        let mut path: SmallVec<[u32; EXPECTED_MAX_DEPTH]> = SmallVec::new();
        let mut leaf_id = self.root_page;
        let mut page = loop {
            let page = self.file.read_page(leaf_id)?;
            let kind = NodeHeader::parse(&page)?.kind();
            match kind {
                Some(NodeKind::Leaf) => break page,
                Some(NodeKind::Interior) => {
                    let interior = InteriorNode::from_page(&page)?;
                    path.push(leaf_id);
                    leaf_id = interior.find_child(key);
                }
                _ => {
                    return Err(StorageError::Corruption {
                        page: leaf_id,
                        reason: "unexpected node kind during descent",
                    }
                    .into())
                }
            }
        };

        let leaf = LeafNode::from_page(&page)?;
        let (mut keys, mut rids) = leaf.entries();
        let pos = keys.partition_point(|&k| k < key);
        if pos < keys.len() && keys[pos] == key {
            return Err(StorageError::DuplicateKey(key).into());
        }
        keys.insert(pos, key);
        rids.insert(pos, rid);

        if keys.len() <= LEAF_CAPACITY {
            node::write_leaf(&mut page, &keys, &rids)?;
            return self.file.write_page(&page);
        }

        // Split: left half stays, right half moves to a fresh page, and
        // the right half's first key becomes the separator.
        let mid = keys.len() / 2;
        let right_keys = keys.split_off(mid);
        let right_rids = rids.split_off(mid);
        let separator = right_keys[0];

        node::write_leaf(&mut page, &keys, &rids)?;
        self.file.write_page(&page)?;

        let right_id = self.file.page_count()?;
        let mut right = Page::new(right_id);
        node::write_leaf(&mut right, &right_keys, &right_rids)?;
        self.file.write_page(&right)?;
        debug!(left = leaf_id, right = right_id, separator, "leaf split");

        self.insert_into_parent(path, separator, leaf_id, right_id)
    }

    /// Flushes the underlying file. Only needed under [`SyncMode::Off`].
    pub fn sync(&self) -> Result<()> {
        self.file.sync()
    }

    /// Propagates a split upward along the descent path: link the new
    /// right sibling next to `left` in its parent, splitting parents that
    /// overflow, until the promotion is absorbed or the root itself has
    /// split.
    fn insert_into_parent(
        &mut self,
        mut path: SmallVec<[u32; EXPECTED_MAX_DEPTH]>,
        separator: u64,
        left: u32,
        right: u32,
    ) -> Result<()> {
        let mut separator = separator;
        let mut left = left;
        let mut right = right;

        while let Some(parent_id) = path.pop() {
            let mut page = self.file.read_page(parent_id)?;
            let interior = InteriorNode::from_page(&page)?;
            let (mut keys, mut children) = interior.keys_and_children();

            let Some(index) = children.iter().position(|&c| c == left) else {
                return Err(StorageError::Corruption {
                    page: parent_id,
                    reason: "split child missing from its parent",
                }
                .into());
            };
            keys.insert(index, separator);
            children.insert(index + 1, right);

            if keys.len() <= INTERIOR_CAPACITY {
                node::write_interior(&mut page, &keys, &children)?;
                return self.file.write_page(&page);
            }

            // The middle key moves up and neither half keeps it.
            let mid = keys.len() / 2;
            let promoted = keys[mid];
            let right_keys = keys.split_off(mid + 1);
            keys.truncate(mid);
            let right_children = children.split_off(mid + 1);

            node::write_interior(&mut page, &keys, &children)?;
            self.file.write_page(&page)?;

            let new_id = self.file.page_count()?;
            let mut new_page = Page::new(new_id);
            node::write_interior(&mut new_page, &right_keys, &right_children)?;
            self.file.write_page(&new_page)?;
            debug!(
                left = parent_id,
                right = new_id,
                separator = promoted,
                "interior split"
            );

            separator = promoted;
            left = parent_id;
            right = new_id;
        }

        // The split reached the root: grow the tree by one level.
        self.grow_root(separator, left, right)
    }

    fn grow_root(&mut self, separator: u64, left: u32, right: u32) -> Result<()> {
        let new_root = self.file.page_count()?;
        let mut page = Page::new(new_root);
        node::write_interior(&mut page, &[separator], &[left, right])?;
        self.file.write_page(&page)?;

        let mut meta = self.file.read_page(META_PAGE_ID)?;
        if NodeHeader::parse(&meta)?.kind() != Some(NodeKind::Meta) {
            return Err(StorageError::Corruption {
                page: META_PAGE_ID,
                reason: "page 0 is not a meta node",
            }
            .into());
        }
        node::write_meta(&mut meta, new_root);
        self.file.write_page(&meta)?;

        self.root_page = new_root;
        debug!(root = new_root, "tree grew a new root");
        Ok(())
    }
}
