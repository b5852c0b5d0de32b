mod file;
mod node;
mod scan;

pub use file::{BTreeFile, BTreeFileHdr};
pub use scan::IndexScan;

use std::fmt;

/// Sentinel: "no node here". Used for the root of an emptied tree and for
/// the sibling pointers of the outermost leaves.
pub const IX_NO_PAGE: i32 = -1;

/// A position inside a B+tree leaf, used as a range-scan cursor. Unlike a
/// Rid this addresses an index slot, not a record; `slot_no` may equal the
/// leaf's size when the Iid is an end sentinel.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Iid {
    pub page_no: i32,
    pub slot_no: i32,
}

impl Iid {
    pub fn new(page_no: i32, slot_no: i32) -> Self {
        Self { page_no, slot_no }
    }
}

impl fmt::Debug for Iid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "iid_{}_{}", self.page_no, self.slot_no)
    }
}
