mod file_handle;
mod scan;

pub use file_handle::{RecordFile, RecordFileHdr};
pub use scan::RecordScan;

use std::fmt;

/// Identifies a record inside a record file. Rids are stable: updates keep
/// them, and a deleted slot's Rid is only reused once a later insert picks
/// the slot again.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rid {
    pub page_no: i32,
    pub slot_no: i32,
}

impl Rid {
    pub const INVALID: Rid = Rid {
        page_no: -1,
        slot_no: -1,
    };

    pub fn new(page_no: i32, slot_no: i32) -> Self {
        Self { page_no, slot_no }
    }
}

impl fmt::Debug for Rid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "rid_{}_{}", self.page_no, self.slot_no)
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
