use crate::error::DbError;
use crate::page_buffer::Page;
use crate::types::DbResult;

/// `0` is reserved to mean "no page" throughout the index file, since
/// page 0 would otherwise collide with a real node — the file's own
/// page numbering here starts at 1 (page 0's byte range is occupied by
/// the root-pointer header instead; see `btree/index.rs`).
pub const NULL_PAGE: u64 = 0;

/// One B+-tree node, decoded into memory. `parent` and `next_leaf` are
/// page numbers, not in-memory references — nodes are never cached by
/// pointer, only read back through the page buffer by page-id, so no
/// reference cycle can form.
#[derive(Debug, Clone, PartialEq)]
pub struct BTreeNode {
    pub is_leaf: bool,
    pub parent: u64,
    /// Leaves only; `NULL_PAGE` for the rightmost leaf.
    pub next_leaf: u64,
    pub keys: Vec<i32>,
    /// Leaf: one value pointer (heap page number) per key, same
    /// length as `keys`. Internal: one more child than `keys`.
    pub children: Vec<u64>,
}

impl BTreeNode {
    pub fn new_leaf(parent: u64) -> Self {
        Self {
            is_leaf: true,
            parent,
            next_leaf: NULL_PAGE,
            keys: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn new_internal(parent: u64) -> Self {
        Self {
            is_leaf: false,
            parent,
            next_leaf: NULL_PAGE,
            keys: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Capacity check: `key_count <= FANOUT - 1`.
    pub fn overflows(&self, fanout: usize) -> bool {
        self.keys.len() > fanout - 1
    }

    /// Encode into a fixed-size page. Layout:
    /// `is_leaf(u8) key_count(u32) parent(u64) next_leaf(u64)`
    /// followed by `fanout - 1` key slots (i32, unused slots zeroed)
    /// then `fanout` pointer slots (u64, unused slots zeroed).
    pub fn encode(&self, page_size: usize, fanout: usize) -> Page {
        let mut page = Page::zeroed(page_size);
        let buf = page.bytes_mut();

        buf[0] = self.is_leaf as u8;
        buf[1..5].copy_from_slice(&(self.keys.len() as u32).to_le_bytes());
        buf[5..13].copy_from_slice(&self.parent.to_le_bytes());
        buf[13..21].copy_from_slice(&self.next_leaf.to_le_bytes());

        let keys_off = HEADER_SIZE;
        for (i, k) in self.keys.iter().enumerate() {
            let at = keys_off + i * 4;
            buf[at..at + 4].copy_from_slice(&k.to_le_bytes());
        }

        let pointers_off = keys_off + (fanout - 1) * 4;
        for (i, p) in self.children.iter().enumerate() {
            let at = pointers_off + i * 8;
            buf[at..at + 8].copy_from_slice(&p.to_le_bytes());
        }

        page
    }

    pub fn decode(page: &Page, fanout: usize) -> DbResult<Self> {
        let buf = page.bytes();
        if buf.len() < HEADER_SIZE {
            return Err(DbError::corrupt_data("page too small to hold a B+-tree node header"));
        }

        let is_leaf = buf[0] != 0;
        let key_count = u32::from_le_bytes(buf[1..5].try_into().unwrap()) as usize;
        let parent = u64::from_le_bytes(buf[5..13].try_into().unwrap());
        let next_leaf = u64::from_le_bytes(buf[13..21].try_into().unwrap());

        if key_count > fanout - 1 {
            return Err(DbError::corrupt_data(format!(
                "node declares key_count {} exceeding FANOUT-1 ({})",
                key_count,
                fanout - 1
            )));
        }

        let keys_off = HEADER_SIZE;
        let mut keys = Vec::with_capacity(key_count);
        for i in 0..key_count {
            let at = keys_off + i * 4;
            keys.push(i32::from_le_bytes(buf[at..at + 4].try_into().unwrap()));
        }

        let pointer_count = if is_leaf { key_count } else { key_count + 1 };
        let pointers_off = keys_off + (fanout - 1) * 4;
        let mut children = Vec::with_capacity(pointer_count);
        for i in 0..pointer_count {
            let at = pointers_off + i * 8;
            children.push(u64::from_le_bytes(buf[at..at + 8].try_into().unwrap()));
        }

        Ok(Self {
            is_leaf,
            parent,
            next_leaf,
            keys,
            children,
        })
    }
}

const HEADER_SIZE: usize = 1 + 4 + 8 + 8;

/// Smallest page size that can hold one node at the given FANOUT;
/// `DbConfig::page_size` must be at least this.
pub fn min_page_size(fanout: usize) -> usize {
    HEADER_SIZE + (fanout - 1) * 4 + fanout * 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_round_trips() {
        let mut node = BTreeNode::new_leaf(NULL_PAGE);
        node.keys = vec![1, 2, 3];
        node.children = vec![10, 11, 12];
        node.next_leaf = 7;

        let page = node.encode(min_page_size(4).max(64), 4);
        let decoded = BTreeNode::decode(&page, 4).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn internal_round_trips() {
        let mut node = BTreeNode::new_internal(5);
        node.keys = vec![10, 20];
        node.children = vec![1, 2, 3];

        let page = node.encode(min_page_size(4).max(64), 4);
        let decoded = BTreeNode::decode(&page, 4).unwrap();
        assert_eq!(decoded, node);
        assert!(!decoded.is_leaf);
    }
}
