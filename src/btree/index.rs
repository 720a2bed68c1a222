use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;

use crate::btree::node::{min_page_size, BTreeNode, NULL_PAGE};
use crate::error::DbError;
use crate::page_buffer::Page;
use crate::types::DbResult;

const HEADER_BYTES: u64 = 8;

/// A persisted B+-tree index file: an 8-byte root-page-number header
/// followed by fixed-size node pages, 1-based (page 0 is reserved as
/// "no page"). Primary-key indexes reject duplicate keys; all others
/// accept them in stable insertion order.
pub struct BTreeIndex {
    file: File,
    page_size: usize,
    fanout: usize,
    unique: bool,
    root: u64,
}

impl BTreeIndex {
    pub fn create<P: AsRef<Path>>(
        path: P,
        page_size: usize,
        fanout: usize,
        unique: bool,
    ) -> DbResult<Self> {
        assert!(
            page_size >= min_page_size(fanout),
            "page_size too small for FANOUT {}",
            fanout
        );

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())?;
        if file.metadata()?.len() == 0 {
            file.write_all(&NULL_PAGE.to_le_bytes())?;
            file.flush()?;
            file.sync_data()?;
        }
        debug!("opened btree index {:?}", path.as_ref());
        Self::from_file(file, page_size, fanout, unique)
    }

    pub fn open_existing<P: AsRef<Path>>(
        path: P,
        page_size: usize,
        fanout: usize,
        unique: bool,
    ) -> DbResult<Self> {
        if !path.as_ref().exists() {
            return Err(DbError::not_found(format!(
                "index file {:?} does not exist",
                path.as_ref()
            )));
        }
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        Self::from_file(file, page_size, fanout, unique)
    }

    fn from_file(mut file: File, page_size: usize, fanout: usize, unique: bool) -> DbResult<Self> {
        file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; 8];
        file.read_exact(&mut buf)?;
        let root = u64::from_le_bytes(buf);
        Ok(Self {
            file,
            page_size,
            fanout,
            unique,
            root,
        })
    }

    fn page_offset(&self, page_no: u64) -> u64 {
        HEADER_BYTES + (page_no - 1) * self.page_size as u64
    }

    fn num_pages(&mut self) -> DbResult<u64> {
        let len = self.file.metadata()?.len();
        Ok((len - HEADER_BYTES) / self.page_size as u64)
    }

    fn read_node(&mut self, page_no: u64) -> DbResult<BTreeNode> {
        self.file.seek(SeekFrom::Start(self.page_offset(page_no)))?;
        let mut buf = vec![0u8; self.page_size];
        self.file.read_exact(&mut buf)?;
        BTreeNode::decode(&Page::from_bytes(buf), self.fanout)
    }

    fn write_node(&mut self, page_no: u64, node: &BTreeNode) -> DbResult<()> {
        let page = node.encode(self.page_size, self.fanout);
        self.file.seek(SeekFrom::Start(self.page_offset(page_no)))?;
        self.file.write_all(page.bytes())?;
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    fn append_node(&mut self, node: &BTreeNode) -> DbResult<u64> {
        let page_no = self.num_pages()? + 1;
        self.write_node(page_no, node)?;
        Ok(page_no)
    }

    /// The header is rewritten and flushed only after the page it
    /// points to is on disk, so a crash mid-insert leaves the root
    /// pointing at the last fully-written page.
    fn set_root(&mut self, page_no: u64) -> DbResult<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&page_no.to_le_bytes())?;
        self.file.flush()?;
        self.file.sync_data()?;
        self.root = page_no;
        Ok(())
    }

    /// Descend from the root to the leaf that would contain `key`,
    /// returning the path of internal page numbers walked (not
    /// including the leaf) and the leaf's page number.
    fn find_leaf(&mut self, key: i32) -> DbResult<(Vec<u64>, u64)> {
        let mut path = Vec::new();
        let mut current = self.root;
        loop {
            let node = self.read_node(current)?;
            if node.is_leaf {
                return Ok((path, current));
            }
            let mut child_index = node.keys.len();
            for (i, k) in node.keys.iter().enumerate() {
                if key < *k {
                    child_index = i;
                    break;
                }
            }
            path.push(current);
            current = node.children[child_index];
        }
    }

    pub fn search(&mut self, key: i32) -> DbResult<Option<u64>> {
        if self.root == NULL_PAGE {
            return Ok(None);
        }
        let (_, leaf_no) = self.find_leaf(key)?;
        let leaf = self.read_node(leaf_no)?;
        match leaf.keys.binary_search(&key) {
            Ok(i) => Ok(Some(leaf.children[i])),
            Err(_) => Ok(None),
        }
    }

    /// Iterate `[lo, hi]` in key order by walking `next_leaf` chains.
    pub fn range(&mut self, lo: i32, hi: i32) -> DbResult<Vec<(i32, u64)>> {
        let mut out = Vec::new();
        if self.root == NULL_PAGE {
            return Ok(out);
        }

        let (_, mut leaf_no) = self.find_leaf(lo)?;
        loop {
            let leaf = self.read_node(leaf_no)?;
            for (k, p) in leaf.keys.iter().zip(leaf.children.iter()) {
                if *k > hi {
                    return Ok(out);
                }
                if *k >= lo {
                    out.push((*k, *p));
                }
            }
            if leaf.next_leaf == NULL_PAGE {
                return Ok(out);
            }
            leaf_no = leaf.next_leaf;
        }
    }

    /// Insert `(key, record_pointer)`. Primary-key (`unique`) indexes
    /// reject a duplicate before any write; non-unique indexes accept
    /// it, ordered after any existing equal keys.
    pub fn insert(&mut self, key: i32, record_pointer: u64) -> DbResult<()> {
        if self.root == NULL_PAGE {
            let mut leaf = BTreeNode::new_leaf(NULL_PAGE);
            leaf.keys.push(key);
            leaf.children.push(record_pointer);
            let page_no = self.append_node(&leaf)?;
            self.set_root(page_no)?;
            return Ok(());
        }

        let (path, leaf_no) = self.find_leaf(key)?;
        let mut leaf = self.read_node(leaf_no)?;

        if self.unique {
            if leaf.keys.binary_search(&key).is_ok() {
                return Err(DbError::duplicate_key(format!(
                    "duplicate key {} in unique index",
                    key
                )));
            }
        }

        let insert_at = leaf
            .keys
            .iter()
            .position(|k| *k > key)
            .unwrap_or(leaf.keys.len());
        leaf.keys.insert(insert_at, key);
        leaf.children.insert(insert_at, record_pointer);

        if !leaf.overflows(self.fanout) {
            self.write_node(leaf_no, &leaf)?;
            return Ok(());
        }

        let mid = leaf.keys.len() / 2;
        let mut new_leaf = BTreeNode::new_leaf(leaf.parent);
        new_leaf.keys = leaf.keys.split_off(mid);
        new_leaf.children = leaf.children.split_off(mid);
        new_leaf.next_leaf = leaf.next_leaf;

        let new_leaf_no = self.append_node(&new_leaf)?;
        leaf.next_leaf = new_leaf_no;
        self.write_node(leaf_no, &leaf)?;

        let separator = new_leaf.keys[0];
        self.insert_into_parent(path, leaf_no, new_leaf_no, separator)
    }

    fn insert_into_parent(
        &mut self,
        mut path: Vec<u64>,
        left: u64,
        right: u64,
        separator: i32,
    ) -> DbResult<()> {
        let parent_no = match path.pop() {
            None => {
                // The leaf (or internal node) that split was the
                // root; grow the tree by one level.
                let mut new_root = BTreeNode::new_internal(NULL_PAGE);
                new_root.keys.push(separator);
                new_root.children = vec![left, right];
                let new_root_no = self.append_node(&new_root)?;
                self.reparent(left, new_root_no)?;
                self.reparent(right, new_root_no)?;
                self.set_root(new_root_no)?;
                return Ok(());
            }
            Some(p) => p,
        };

        let mut parent = self.read_node(parent_no)?;
        let insert_at = parent
            .keys
            .iter()
            .position(|k| *k > separator)
            .unwrap_or(parent.keys.len());
        parent.keys.insert(insert_at, separator);
        parent.children.insert(insert_at + 1, right);
        self.reparent(right, parent_no)?;

        if !parent.overflows(self.fanout) {
            self.write_node(parent_no, &parent)?;
            return Ok(());
        }

        // Internal split: the middle key is promoted, not duplicated
        // into either half.
        let mid = parent.keys.len() / 2;
        let promoted = parent.keys[mid];

        let mut new_internal = BTreeNode::new_internal(parent.parent);
        new_internal.keys = parent.keys.split_off(mid + 1);
        new_internal.children = parent.children.split_off(mid + 1);
        parent.keys.pop(); // drop the promoted key from the left half

        let new_internal_no = self.append_node(&new_internal)?;
        let moved_children = new_internal.children.clone();
        self.write_node(parent_no, &parent)?;
        for child in moved_children {
            self.reparent(child, new_internal_no)?;
        }

        self.insert_into_parent(path, parent_no, new_internal_no, promoted)
    }

    fn reparent(&mut self, page_no: u64, new_parent: u64) -> DbResult<()> {
        let mut node = self.read_node(page_no)?;
        node.parent = new_parent;
        self.write_node(page_no, &node)
    }

    /// Mark the leaf entry for `key` vacant in place. Per the §9
    /// open-question resolution, deletes never merge or redistribute
    /// nodes; space is reclaimed only when the heap itself is
    /// rewritten and the index rebuilt from scratch.
    pub fn remove(&mut self, key: i32) -> DbResult<bool> {
        if self.root == NULL_PAGE {
            return Ok(false);
        }
        let (_, leaf_no) = self.find_leaf(key)?;
        let mut leaf = self.read_node(leaf_no)?;
        match leaf.keys.binary_search(&key) {
            Ok(i) => {
                leaf.keys.remove(i);
                leaf.children.remove(i);
                self.write_node(leaf_no, &leaf)?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root == NULL_PAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempfile(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "small-reldb-btree-test-{}-{}",
            std::process::id(),
            rand::random::<u64>()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn insert_and_search_without_split() {
        let mut idx = BTreeIndex::create(tempfile("a.idx"), 256, 4, true).unwrap();
        idx.insert(1, 100).unwrap();
        idx.insert(2, 200).unwrap();
        assert_eq!(idx.search(1).unwrap(), Some(100));
        assert_eq!(idx.search(2).unwrap(), Some(200));
        assert_eq!(idx.search(3).unwrap(), None);
    }

    #[test]
    fn duplicate_key_rejected_in_unique_index() {
        let mut idx = BTreeIndex::create(tempfile("b.idx"), 256, 4, true).unwrap();
        idx.insert(1, 100).unwrap();
        match idx.insert(1, 200) {
            Err(DbError::DuplicateKey(_)) => {}
            other => panic!("expected DuplicateKey, got {:?}", other),
        }
    }

    #[test]
    fn insert_forces_leaf_and_root_split() {
        // FANOUT 4 => a leaf holds at most 3 keys before splitting.
        let mut idx = BTreeIndex::create(tempfile("c.idx"), 256, 4, true).unwrap();
        for k in 1..=10 {
            idx.insert(k, k as u64 * 10).unwrap();
        }
        for k in 1..=10 {
            assert_eq!(idx.search(k).unwrap(), Some(k as u64 * 10));
        }
        let collected = idx.range(1, 10).unwrap();
        let keys: Vec<i32> = collected.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn range_respects_bounds() {
        let mut idx = BTreeIndex::create(tempfile("d.idx"), 256, 4, true).unwrap();
        for k in 1..=10 {
            idx.insert(k, k as u64).unwrap();
        }
        let mid = idx.range(4, 6).unwrap();
        assert_eq!(mid.iter().map(|(k, _)| *k).collect::<Vec<_>>(), vec![4, 5, 6]);
    }

    #[test]
    fn remove_marks_entry_vacant() {
        let mut idx = BTreeIndex::create(tempfile("e.idx"), 256, 4, true).unwrap();
        idx.insert(1, 10).unwrap();
        idx.insert(2, 20).unwrap();
        assert!(idx.remove(1).unwrap());
        assert_eq!(idx.search(1).unwrap(), None);
        assert_eq!(idx.search(2).unwrap(), Some(20));
        assert!(!idx.remove(99).unwrap());
    }
}
