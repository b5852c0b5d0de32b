use log::error;

use crate::{
    btree::{file::BTreeFile, Iid},
    record::Rid,
};

/// Forward cursor over `[begin, end)` index positions, yielding the Rid
/// stored at each. Walks slots within a leaf and hops through `next_leaf`
/// at leaf boundaries.
pub struct IndexScan<'a> {
    file: &'a BTreeFile,
    iid: Iid,
    end: Iid,
}

impl<'a> IndexScan<'a> {
    pub fn new(file: &'a BTreeFile, begin: Iid, end: Iid) -> Self {
        Self {
            file,
            iid: begin,
            end,
        }
    }

    pub fn iid(&self) -> Iid {
        self.iid
    }

    pub fn is_end(&self) -> bool {
        self.iid == self.end
    }
}

impl<'a> Iterator for IndexScan<'a> {
    type Item = Rid;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_end() {
            return None;
        }
        let rid = match self.file.get_rid(self.iid) {
            Ok(rid) => rid,
            Err(e) => {
                error!("index scan aborted at {:?}: {}", self.iid, e);
                return None;
            }
        };
        match self.file.next_iid(self.iid) {
            Ok(next) => self.iid = next,
            Err(e) => {
                error!("index scan aborted at {:?}: {}", self.iid, e);
                self.iid = self.end;
            }
        }
        Some(rid)
    }
}
