use log::error;

use crate::record::{file_handle::RecordFile, Rid};

/// Forward-only cursor over every live record of a file, in
/// (page_no, slot_no) order. Single pass; pages are pinned only for the
/// duration of each bitmap probe.
pub struct RecordScan<'a> {
    file: &'a RecordFile,
    rid: Rid,
}

impl<'a> RecordScan<'a> {
    pub fn new(file: &'a RecordFile) -> Self {
        Self {
            file,
            // data pages start at 1; slot -1 so the first advance probes
            // slot 0
            rid: Rid::new(1, -1),
        }
    }

    fn advance(&mut self) -> crate::error::Result<Option<Rid>> {
        let num_pages = self.file.get_file_hdr().num_pages;
        while self.rid.page_no < num_pages {
            match self
                .file
                .fetch_next_set_slot(self.rid.page_no, self.rid.slot_no)?
            {
                Some(slot_no) => {
                    self.rid.slot_no = slot_no;
                    return Ok(Some(self.rid));
                }
                None => {
                    self.rid.page_no += 1;
                    self.rid.slot_no = -1;
                }
            }
        }
        Ok(None)
    }
}

impl<'a> Iterator for RecordScan<'a> {
    type Item = Rid;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(rid) => rid,
            Err(e) => {
                error!("record scan aborted: {}", e);
                None
            }
        }
    }
}
