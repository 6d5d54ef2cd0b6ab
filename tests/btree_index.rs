//! B-tree index properties: the point-lookup law under sequential and
//! shuffled insertion, duplicate rejection, on-disk ordering invariants,
//! and multi-level growth.

use duskdb::btree::{
    InteriorNode, LeafNode, NodeHeader, NodeKind, META_PAGE_ID,
};
use duskdb::storage::Rid;
use duskdb::{BTree, HeapFile, PageFile, StorageError, SyncMode};
use tempfile::tempdir;

fn open_tree(dir: &tempfile::TempDir) -> BTree {
    BTree::open(dir.path().join("index.db")).unwrap()
}

/// Walks the tree on disk, asserting strict key ascent in every node and
/// that every key in a subtree falls inside the separator bounds of its
/// parent. Returns the depths at which leaves were found.
fn check_ordering(
    file: &PageFile,
    page_id: u32,
    lower: Option<u64>,
    upper: Option<u64>,
    depth: usize,
    leaf_depths: &mut Vec<usize>,
) {
    let page = file.read_page(page_id).unwrap();
    let header = NodeHeader::parse(&page).unwrap();

    let in_bounds = |key: u64| {
        lower.map_or(true, |lo| key >= lo) && upper.map_or(true, |hi| key < hi)
    };

    match header.kind().unwrap() {
        NodeKind::Leaf => {
            let leaf = LeafNode::from_page(&page).unwrap();
            for i in 0..leaf.count() {
                assert!(
                    in_bounds(leaf.key_at(i)),
                    "leaf {page_id} key {} escapes ({lower:?}, {upper:?})",
                    leaf.key_at(i)
                );
                if i > 0 {
                    assert!(
                        leaf.key_at(i - 1) < leaf.key_at(i),
                        "leaf {page_id} keys not strictly ascending"
                    );
                }
            }
            leaf_depths.push(depth);
        }
        NodeKind::Interior => {
            let interior = InteriorNode::from_page(&page).unwrap();
            for i in 0..interior.count() {
                assert!(
                    in_bounds(interior.key_at(i)),
                    "interior {page_id} separator {} escapes ({lower:?}, {upper:?})",
                    interior.key_at(i)
                );
                if i > 0 {
                    assert!(
                        interior.key_at(i - 1) < interior.key_at(i),
                        "interior {page_id} separators not strictly ascending"
                    );
                }
            }
            for i in 0..=interior.count() {
                let child_lower = if i == 0 { lower } else { Some(interior.key_at(i - 1)) };
                let child_upper = if i == interior.count() {
                    upper
                } else {
                    Some(interior.key_at(i))
                };
                check_ordering(
                    file,
                    interior.child_at(i),
                    child_lower,
                    child_upper,
                    depth + 1,
                    leaf_depths,
                );
            }
        }
        NodeKind::Meta => panic!("meta node reached during tree walk"),
    }
}

fn verify_tree(path: &std::path::Path, root: u32) -> (usize, Vec<usize>) {
    let file = PageFile::open(path).unwrap();
    let mut leaf_depths = Vec::new();
    check_ordering(&file, root, None, None, 0, &mut leaf_depths);

    let first = leaf_depths[0];
    assert!(
        leaf_depths.iter().all(|&d| d == first),
        "leaves at unequal depths"
    );
    (first, leaf_depths)
}

#[test]
fn two_thousand_sequential_keys_all_resolve() {
    let dir = tempdir().unwrap();
    let mut tree = open_tree(&dir);

    for i in 1..=2000u64 {
        let rid = Rid::new((i % 1234) as u32, (i % 4096) as u16);
        tree.insert(i, rid).unwrap();
    }

    for i in 1..=2000u64 {
        let expected = Rid::new((i % 1234) as u32, (i % 4096) as u16);
        assert_eq!(tree.get(i).unwrap(), Some(expected), "key {i}");
    }
    assert_eq!(tree.get(0).unwrap(), None);
    assert_eq!(tree.get(2001).unwrap(), None);
}

#[test]
fn duplicate_key_is_rejected_and_state_kept() {
    let dir = tempdir().unwrap();
    let mut tree = open_tree(&dir);

    tree.insert(42, Rid::new(1, 1)).unwrap();
    let err = tree.insert(42, Rid::new(2, 2)).unwrap_err();
    assert_eq!(
        err.downcast_ref::<StorageError>(),
        Some(&StorageError::DuplicateKey(42))
    );
    assert_eq!(tree.get(42).unwrap(), Some(Rid::new(1, 1)));
}

#[test]
fn shuffled_insertion_satisfies_the_point_law() {
    let dir = tempdir().unwrap();
    let mut tree = BTree::open_with(dir.path().join("index.db"), SyncMode::Off).unwrap();

    // A stride permutation stands in for a random order: 2641 is coprime
    // with 5000, so every key appears exactly once.
    let n: u64 = 5000;
    for i in 0..n {
        let key = (i * 2641) % n;
        tree.insert(key, Rid::new(key as u32, (key % 97) as u16)).unwrap();
    }

    for key in 0..n {
        assert_eq!(
            tree.get(key).unwrap(),
            Some(Rid::new(key as u32, (key % 97) as u16)),
            "key {key}"
        );
    }
    assert_eq!(tree.get(n).unwrap(), None);
    assert_eq!(tree.get(u64::MAX).unwrap(), None);
}

#[test]
fn wide_keyspace_probes_after_many_splits() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.db");
    let mut tree = BTree::open_with(&path, SyncMode::Off).unwrap();

    const N: u64 = 10_000;
    for i in (10..=10 * N).step_by(10) {
        tree.insert(i, Rid::new(i as u32, (i % 65_536) as u16)).unwrap();
    }

    for i in (10..=10 * N).step_by(123 * 10) {
        assert_eq!(
            tree.get(i).unwrap(),
            Some(Rid::new(i as u32, (i % 65_536) as u16)),
            "probe {i}"
        );
    }
    // Keys between the stride values are absent.
    assert_eq!(tree.get(15).unwrap(), None);
    assert_eq!(tree.get(10 * N + 10).unwrap(), None);

    let (depth, leaves) = verify_tree(&path, tree.root_page());
    assert!(depth >= 1, "ten thousand keys must not fit one leaf");
    assert!(leaves.len() > 1);
}

#[test]
fn ordering_invariants_hold_after_interleaved_inserts() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.db");
    let mut tree = BTree::open_with(&path, SyncMode::Off).unwrap();

    // Ascending, descending, and middle-out batches interleaved.
    for i in 0..1000u64 {
        tree.insert(i * 3, Rid::default()).unwrap();
        tree.insert(1_000_000 - i * 7, Rid::default()).unwrap();
        tree.insert(500_000 + i * 11, Rid::default()).unwrap();
    }

    verify_tree(&path, tree.root_page());
}

#[test]
fn bulk_load_reaches_two_interior_levels() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.db");
    let mut tree = BTree::open_with(&path, SyncMode::Off).unwrap();

    const N: u64 = 50_000;
    for i in 0..N {
        tree.insert(i, Rid::new(i as u32, (i % 4096) as u16)).unwrap();
    }
    tree.sync().unwrap();

    // Root and at least one of its children are interior nodes.
    let file = PageFile::open(&path).unwrap();
    let root = file.read_page(tree.root_page()).unwrap();
    let root_node = InteriorNode::from_page(&root).unwrap();
    let child = file.read_page(root_node.child_at(0)).unwrap();
    assert_eq!(
        NodeHeader::parse(&child).unwrap().kind(),
        Some(NodeKind::Interior),
        "expected a second interior level"
    );

    let (depth, _) = verify_tree(&path, tree.root_page());
    assert!(depth >= 2);

    for i in (0..N).step_by(977) {
        assert_eq!(
            tree.get(i).unwrap(),
            Some(Rid::new(i as u32, (i % 4096) as u16))
        );
    }
}

#[test]
fn reopened_tree_serves_the_same_mappings() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.db");

    {
        let mut tree = BTree::open(&path).unwrap();
        for i in 0..600u64 {
            tree.insert(i, Rid::new(i as u32, 0)).unwrap();
        }
    }

    let tree = BTree::open(&path).unwrap();
    for i in 0..600u64 {
        assert_eq!(tree.get(i).unwrap(), Some(Rid::new(i as u32, 0)));
    }
    assert_eq!(tree.get(600).unwrap(), None);
}

#[test]
fn meta_page_tracks_the_live_root() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.db");
    let mut tree = BTree::open(&path).unwrap();

    for i in 0..600u64 {
        tree.insert(i, Rid::default()).unwrap();
    }

    let file = PageFile::open(&path).unwrap();
    let meta = file.read_page(META_PAGE_ID).unwrap();
    let header = NodeHeader::parse(&meta).unwrap();
    assert_eq!(header.kind(), Some(NodeKind::Meta));
    assert_eq!(header.aux(), tree.root_page());
}

#[test]
fn heap_and_index_compose_into_keyed_storage() {
    let dir = tempdir().unwrap();
    let mut heap = HeapFile::open(dir.path().join("records.db")).unwrap();
    let mut index = BTree::open(dir.path().join("index.db")).unwrap();

    let entries: Vec<(u64, String)> = (0..200u64)
        .map(|i| (i * 13 + 1, format!("record body {i:04}")))
        .collect();

    for (key, body) in &entries {
        let rid = heap.insert(body.as_bytes()).unwrap();
        index.insert(*key, rid).unwrap();
    }

    for (key, body) in &entries {
        let rid = index.get(*key).unwrap().expect("indexed key vanished");
        assert_eq!(heap.get(rid).unwrap(), body.as_bytes());
    }
    assert_eq!(index.get(0).unwrap(), None);
}
