use std::sync::{Arc, RwLock};

use crate::{
    btree::{file::BTreeFileHdr, IX_NO_PAGE},
    record::Rid,
    storage::{Page, PageId},
    system::ColType,
    utils::HandyRwLock,
};

/// Node header layout: is_leaf (byte 0), num_keys (4..8), parent (8..12),
/// prev_leaf (12..16), next_leaf (16..20). Keys and rids follow as two
/// fixed-stride arrays; for internal nodes a rid's page_no is the child
/// page and slot_no is unused.
pub(crate) const NODE_HDR_SIZE: usize = 20;

const RID_SIZE: usize = 8;

/// Handle over one pinned B+tree page. Accessors take the page's own
/// latch for the duration of each call; higher-level consistency comes
/// from the tree latch held by the caller.
pub(crate) struct BTreeNode {
    pid: PageId,
    page: Arc<RwLock<Page>>,
    col_type: ColType,
    col_len: usize,
    max_size: usize,
}

impl BTreeNode {
    pub(crate) fn new(pid: PageId, page: Arc<RwLock<Page>>, hdr: &BTreeFileHdr) -> Self {
        Self {
            pid,
            page,
            col_type: hdr.col_type,
            col_len: hdr.col_len,
            max_size: hdr.max_size,
        }
    }

    pub(crate) fn pid(&self) -> PageId {
        self.pid
    }

    pub(crate) fn page_no(&self) -> i32 {
        self.pid.page_no
    }

    /// Zero the header of a freshly allocated node.
    pub(crate) fn init(&self, is_leaf: bool, parent: i32) {
        let mut page = self.page.wl();
        let data = page.data_mut();
        data[0] = is_leaf as u8;
        data[4..8].copy_from_slice(&0u32.to_le_bytes());
        data[8..12].copy_from_slice(&parent.to_le_bytes());
        data[12..16].copy_from_slice(&IX_NO_PAGE.to_le_bytes());
        data[16..20].copy_from_slice(&IX_NO_PAGE.to_le_bytes());
    }

    fn read_i32(&self, off: usize) -> i32 {
        let page = self.page.rl();
        let d = page.data();
        i32::from_le_bytes([d[off], d[off + 1], d[off + 2], d[off + 3]])
    }

    fn write_i32(&self, off: usize, v: i32) {
        let mut page = self.page.wl();
        page.data_mut()[off..off + 4].copy_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.page.rl().data()[0] != 0
    }

    pub(crate) fn set_is_leaf(&self, is_leaf: bool) {
        self.page.wl().data_mut()[0] = is_leaf as u8;
    }

    pub(crate) fn size(&self) -> usize {
        self.read_i32(4) as usize
    }

    fn set_size(&self, size: usize) {
        self.write_i32(4, size as i32);
    }

    pub(crate) fn parent(&self) -> i32 {
        self.read_i32(8)
    }

    pub(crate) fn set_parent(&self, page_no: i32) {
        self.write_i32(8, page_no);
    }

    pub(crate) fn prev_leaf(&self) -> i32 {
        self.read_i32(12)
    }

    pub(crate) fn set_prev_leaf(&self, page_no: i32) {
        self.write_i32(12, page_no);
    }

    pub(crate) fn next_leaf(&self) -> i32 {
        self.read_i32(16)
    }

    pub(crate) fn set_next_leaf(&self, page_no: i32) {
        self.write_i32(16, page_no);
    }

    fn key_off(&self, idx: usize) -> usize {
        NODE_HDR_SIZE + idx * self.col_len
    }

    fn rid_off(&self, idx: usize) -> usize {
        NODE_HDR_SIZE + self.max_size * self.col_len + idx * RID_SIZE
    }

    pub(crate) fn key_at(&self, idx: usize) -> Vec<u8> {
        let off = self.key_off(idx);
        self.page.rl().data()[off..off + self.col_len].to_vec()
    }

    pub(crate) fn set_key_at(&self, idx: usize, key: &[u8]) {
        let off = self.key_off(idx);
        self.page.wl().data_mut()[off..off + self.col_len].copy_from_slice(&key[..self.col_len]);
    }

    pub(crate) fn rid_at(&self, idx: usize) -> Rid {
        let off = self.rid_off(idx);
        let page = self.page.rl();
        let d = page.data();
        Rid::new(
            i32::from_le_bytes([d[off], d[off + 1], d[off + 2], d[off + 3]]),
            i32::from_le_bytes([d[off + 4], d[off + 5], d[off + 6], d[off + 7]]),
        )
    }

    fn set_rid_at(&self, idx: usize, rid: Rid) {
        let off = self.rid_off(idx);
        let mut page = self.page.wl();
        let d = page.data_mut();
        d[off..off + 4].copy_from_slice(&rid.page_no.to_le_bytes());
        d[off + 4..off + 8].copy_from_slice(&rid.slot_no.to_le_bytes());
    }

    /// Child page number for an internal node slot.
    pub(crate) fn child_at(&self, idx: usize) -> i32 {
        self.rid_at(idx).page_no
    }

    /// Insert one (key, rid) pair at `pos`, shifting the tail right.
    pub(crate) fn insert_pair(&self, pos: usize, key: &[u8], rid: Rid) {
        let size = self.size();
        debug_assert!(pos <= size && size < self.max_size);
        for i in (pos..size).rev() {
            let k = self.key_at(i);
            self.set_key_at(i + 1, &k);
            self.set_rid_at(i + 1, self.rid_at(i));
        }
        self.set_key_at(pos, key);
        self.set_rid_at(pos, rid);
        self.set_size(size + 1);
    }

    /// Append pairs at the tail (bulk move during split and coalesce).
    pub(crate) fn append_pairs(&self, pairs: &[(Vec<u8>, Rid)]) {
        let mut size = self.size();
        for (key, rid) in pairs {
            self.set_key_at(size, key);
            self.set_rid_at(size, *rid);
            size += 1;
        }
        self.set_size(size);
    }

    /// Remove the pair at `pos`, shifting the tail left.
    pub(crate) fn erase_pair(&self, pos: usize) {
        let size = self.size();
        debug_assert!(pos < size);
        for i in pos + 1..size {
            let k = self.key_at(i);
            self.set_key_at(i - 1, &k);
            self.set_rid_at(i - 1, self.rid_at(i));
        }
        self.set_size(size - 1);
    }

    /// Detach and return the pairs in `[from, size)`.
    pub(crate) fn take_tail(&self, from: usize) -> Vec<(Vec<u8>, Rid)> {
        let size = self.size();
        let mut out = Vec::with_capacity(size - from);
        for i in from..size {
            out.push((self.key_at(i), self.rid_at(i)));
        }
        self.set_size(from);
        out
    }

    /// First index whose key is >= `key` (== size when none).
    pub(crate) fn lower_bound(&self, key: &[u8]) -> usize {
        let (mut lo, mut hi) = (0, self.size());
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.col_type.compare(&self.key_at(mid), key) == std::cmp::Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// First index whose key is > `key` (== size when none).
    pub(crate) fn upper_bound(&self, key: &[u8]) -> usize {
        let (mut lo, mut hi) = (0, self.size());
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.col_type.compare(&self.key_at(mid), key) == std::cmp::Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    /// Exact-match probe in a leaf.
    pub(crate) fn leaf_lookup(&self, key: &[u8]) -> Option<Rid> {
        let pos = self.lower_bound(key);
        if pos < self.size() && self.col_type.compare(&self.key_at(pos), key).is_eq() {
            Some(self.rid_at(pos))
        } else {
            None
        }
    }

    /// Routing step in an internal node: the child whose subtree covers
    /// `key`. The first key acts as −∞, so keys below it route to child 0.
    pub(crate) fn internal_lookup(&self, key: &[u8]) -> i32 {
        let pos = self.upper_bound(key);
        let idx = if pos == 0 { 0 } else { pos - 1 };
        self.child_at(idx)
    }

    /// Position of `child_page_no` among this internal node's children.
    pub(crate) fn find_child(&self, child_page_no: i32) -> Option<usize> {
        (0..self.size()).find(|i| self.child_at(*i) == child_page_no)
    }
}
