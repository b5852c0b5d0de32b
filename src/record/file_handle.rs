use std::{
    path::Path,
    sync::{Arc, RwLock, RwLockWriteGuard},
};

use log::debug;

use crate::{
    error::{Error, Result},
    record::Rid,
    storage::{BufferPool, DiskManager, Page, PageId, INVALID_PAGE_ID, PAGE_SIZE},
    transaction::Context,
    utils::{bitmap, HandyRwLock},
};

/// Page 0 of a record file holds the file header.
const FILE_HDR_PAGE: i32 = 0;

/// Per-page header: next_free_page_no (i32) + num_records (u32).
const PAGE_HDR_SIZE: usize = 8;

/// On-disk file header, kept in memory for the lifetime of the handle and
/// written back on close.
#[derive(Clone, Copy, Debug)]
pub struct RecordFileHdr {
    pub record_size: usize,
    pub num_records_per_page: usize,
    pub first_free_page_no: i32,
    pub num_pages: i32,
    pub bitmap_size: usize,
}

impl RecordFileHdr {
    /// Fit as many fixed-size slots as the page allows: one occupancy bit
    /// and `record_size` bytes per slot, after the page header.
    fn for_record_size(record_size: usize) -> Self {
        let mut n = (PAGE_SIZE - PAGE_HDR_SIZE) * 8 / (record_size * 8 + 1);
        while PAGE_HDR_SIZE + (n + 7) / 8 + n * record_size > PAGE_SIZE {
            n -= 1;
        }
        Self {
            record_size,
            num_records_per_page: n,
            first_free_page_no: INVALID_PAGE_ID,
            num_pages: 1,
            bitmap_size: (n + 7) / 8,
        }
    }

    fn to_bytes(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&(self.record_size as u32).to_le_bytes());
        buf[4..8].copy_from_slice(&(self.num_records_per_page as u32).to_le_bytes());
        buf[8..12].copy_from_slice(&self.first_free_page_no.to_le_bytes());
        buf[12..16].copy_from_slice(&self.num_pages.to_le_bytes());
        buf[16..20].copy_from_slice(&(self.bitmap_size as u32).to_le_bytes());
    }

    fn from_bytes(buf: &[u8]) -> Self {
        let read_u32 = |off: usize| {
            u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
        };
        let read_i32 = |off: usize| {
            i32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
        };
        Self {
            record_size: read_u32(0) as usize,
            num_records_per_page: read_u32(4) as usize,
            first_free_page_no: read_i32(8),
            num_pages: read_i32(12),
            bitmap_size: read_u32(16) as usize,
        }
    }
}

fn page_next_free(data: &[u8]) -> i32 {
    i32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

fn set_page_next_free(data: &mut [u8], page_no: i32) {
    data[0..4].copy_from_slice(&page_no.to_le_bytes());
}

fn page_num_records(data: &[u8]) -> usize {
    u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize
}

fn set_page_num_records(data: &mut [u8], n: usize) {
    data[4..8].copy_from_slice(&(n as u32).to_le_bytes());
}

/// Slotted-page heap file. Pages with at least one free slot are threaded
/// into a singly linked free list headed by `first_free_page_no`.
pub struct RecordFile {
    fd: i32,
    buffer_pool: Arc<BufferPool>,
    file_hdr: RwLock<RecordFileHdr>,
}

impl RecordFile {
    /// Create a record file for fixed-size records and write its header.
    pub fn create(
        path: impl AsRef<Path>,
        record_size: usize,
        disk_manager: &DiskManager,
    ) -> Result<()> {
        disk_manager.create_file(&path)?;
        let fd = disk_manager.open_file(&path)?;
        let hdr_page_no = disk_manager.allocate_page(fd)?;
        debug_assert_eq!(hdr_page_no, FILE_HDR_PAGE);

        let hdr = RecordFileHdr::for_record_size(record_size);
        let mut buf = [0u8; PAGE_SIZE];
        hdr.to_bytes(&mut buf);
        disk_manager.write_page(fd, FILE_HDR_PAGE, &buf)?;
        disk_manager.close_file(fd)?;
        Ok(())
    }

    pub fn open(path: impl AsRef<Path>, buffer_pool: Arc<BufferPool>) -> Result<Self> {
        let disk_manager = Arc::clone(buffer_pool.get_disk_manager());
        let fd = disk_manager.open_file(&path)?;
        let mut buf = [0u8; PAGE_SIZE];
        disk_manager.read_page(fd, FILE_HDR_PAGE, &mut buf)?;
        let hdr = RecordFileHdr::from_bytes(&buf);
        Ok(Self {
            fd,
            buffer_pool,
            file_hdr: RwLock::new(hdr),
        })
    }

    /// Write the header back, flush the file's dirty pages and close it.
    pub fn close(&self) -> Result<()> {
        let hdr = self.file_hdr.rl();
        let mut buf = [0u8; PAGE_SIZE];
        hdr.to_bytes(&mut buf);
        let disk_manager = self.buffer_pool.get_disk_manager();
        disk_manager.write_page(self.fd, FILE_HDR_PAGE, &buf)?;
        self.buffer_pool.evict_all_pages(self.fd)?;
        disk_manager.close_file(self.fd)?;
        Ok(())
    }

    pub fn get_fd(&self) -> i32 {
        self.fd
    }

    pub fn get_file_hdr(&self) -> RecordFileHdr {
        *self.file_hdr.rl()
    }

    /// Read a record under a shared record lock. Returns a copy of the
    /// slot bytes.
    pub fn get_record(&self, rid: Rid, ctx: &Context) -> Result<Vec<u8>> {
        ctx.lock_mgr
            .lock_shared_on_record(ctx.txn, rid, self.fd)?;
        let hdr = self.get_file_hdr();
        self.check_rid(&hdr, rid)?;

        let pid = PageId::new(self.fd, rid.page_no);
        let page = self.buffer_pool.fetch_page(pid)?;
        let result = {
            let page = page.rl();
            let data = page.data();
            if !bitmap::is_set(&data[PAGE_HDR_SIZE..], rid.slot_no as usize) {
                Err(Error::RecordNotFound {
                    page_no: rid.page_no,
                    slot_no: rid.slot_no,
                })
            } else {
                let off = self.slot_offset(&hdr, rid.slot_no);
                Ok(data[off..off + hdr.record_size].to_vec())
            }
        };
        self.buffer_pool.unpin_page(pid, false);
        result
    }

    /// Insert a record into the first free slot of the first free page,
    /// creating a page when the free list is empty. Takes no lock itself
    /// (the Rid is unknown until the slot is picked); the DML layer holds
    /// table IX and locks the returned Rid.
    pub fn insert_record(&self, buf: &[u8], _ctx: &Context) -> Result<Rid> {
        let mut hdr = self.file_hdr.wl();
        loop {
            let (pid, page) = if hdr.first_free_page_no == INVALID_PAGE_ID {
                self.create_page(&mut hdr)?
            } else {
                let pid = PageId::new(self.fd, hdr.first_free_page_no);
                (pid, self.buffer_pool.fetch_page(pid)?)
            };

            let inserted = {
                let mut page = page.wl();
                let data = page.data_mut();
                match bitmap::first_unset(
                    &data[PAGE_HDR_SIZE..PAGE_HDR_SIZE + hdr.bitmap_size],
                    hdr.num_records_per_page,
                ) {
                    Some(slot_no) => {
                        let off = self.slot_offset(&hdr, slot_no as i32);
                        data[off..off + hdr.record_size].copy_from_slice(&buf[..hdr.record_size]);
                        bitmap::set(&mut data[PAGE_HDR_SIZE..], slot_no);
                        let n = page_num_records(data) + 1;
                        set_page_num_records(data, n);
                        if n == hdr.num_records_per_page {
                            // page is full now, pop it off the free list
                            hdr.first_free_page_no = page_next_free(data);
                        }
                        Some(slot_no as i32)
                    }
                    None => {
                        // a stale free-list entry (page refilled by a
                        // rollback); drop it and retry
                        hdr.first_free_page_no = page_next_free(data);
                        None
                    }
                }
            };

            self.buffer_pool.unpin_page(pid, true);
            if let Some(slot_no) = inserted {
                return Ok(Rid::new(pid.page_no, slot_no));
            }
        }
    }

    /// Overwrite a record's bytes under an exclusive record lock. Indexes
    /// are the caller's responsibility.
    pub fn update_record(&self, rid: Rid, buf: &[u8], ctx: &Context) -> Result<()> {
        ctx.lock_mgr
            .lock_exclusive_on_record(ctx.txn, rid, self.fd)?;
        let hdr = self.get_file_hdr();
        self.check_rid(&hdr, rid)?;

        let pid = PageId::new(self.fd, rid.page_no);
        let page = self.buffer_pool.fetch_page(pid)?;
        let result = {
            let mut page = page.wl();
            let data = page.data_mut();
            if !bitmap::is_set(&data[PAGE_HDR_SIZE..], rid.slot_no as usize) {
                Err(Error::RecordNotFound {
                    page_no: rid.page_no,
                    slot_no: rid.slot_no,
                })
            } else {
                let off = self.slot_offset(&hdr, rid.slot_no);
                data[off..off + hdr.record_size].copy_from_slice(&buf[..hdr.record_size]);
                Ok(())
            }
        };
        self.buffer_pool.unpin_page(pid, true);
        result
    }

    /// Clear a record's slot under an exclusive record lock. A page going
    /// from full to non-full is pushed back onto the free list.
    pub fn delete_record(&self, rid: Rid, ctx: &Context) -> Result<()> {
        ctx.lock_mgr
            .lock_exclusive_on_record(ctx.txn, rid, self.fd)?;
        let mut hdr = self.file_hdr.wl();
        self.check_rid(&hdr, rid)?;

        let pid = PageId::new(self.fd, rid.page_no);
        let page = self.buffer_pool.fetch_page(pid)?;
        let result = {
            let mut page = page.wl();
            let data = page.data_mut();
            if !bitmap::is_set(&data[PAGE_HDR_SIZE..], rid.slot_no as usize) {
                Err(Error::RecordNotFound {
                    page_no: rid.page_no,
                    slot_no: rid.slot_no,
                })
            } else {
                bitmap::reset(&mut data[PAGE_HDR_SIZE..], rid.slot_no as usize);
                let n = page_num_records(data);
                set_page_num_records(data, n - 1);
                if n == hdr.num_records_per_page {
                    set_page_next_free(data, hdr.first_free_page_no);
                    hdr.first_free_page_no = rid.page_no;
                }
                Ok(())
            }
        };
        self.buffer_pool.unpin_page(pid, true);
        result
    }

    /// Rollback-only: put a record back at an exact Rid. No locking, no
    /// free-list prepend; it restores a slot a previous delete cleared.
    pub fn restore_record(&self, rid: Rid, buf: &[u8]) -> Result<()> {
        let mut hdr = self.file_hdr.wl();
        while rid.page_no >= hdr.num_pages {
            let (pid, _) = self.create_page(&mut hdr)?;
            self.buffer_pool.unpin_page(pid, true);
        }

        let pid = PageId::new(self.fd, rid.page_no);
        let page = self.buffer_pool.fetch_page(pid)?;
        {
            let mut page = page.wl();
            let data = page.data_mut();
            bitmap::set(&mut data[PAGE_HDR_SIZE..], rid.slot_no as usize);
            let n = page_num_records(data) + 1;
            set_page_num_records(data, n);
            if n == hdr.num_records_per_page && hdr.first_free_page_no == rid.page_no {
                hdr.first_free_page_no = page_next_free(data);
            }
            let off = self.slot_offset(&hdr, rid.slot_no);
            data[off..off + hdr.record_size].copy_from_slice(&buf[..hdr.record_size]);
        }
        self.buffer_pool.unpin_page(pid, true);
        Ok(())
    }

    /// Slot-bit probe used by the scan cursor.
    pub(crate) fn fetch_next_set_slot(&self, page_no: i32, after: i32) -> Result<Option<i32>> {
        let hdr = self.get_file_hdr();
        let pid = PageId::new(self.fd, page_no);
        let page = self.buffer_pool.fetch_page(pid)?;
        let pos = {
            let page = page.rl();
            bitmap::next_set(
                &page.data()[PAGE_HDR_SIZE..PAGE_HDR_SIZE + hdr.bitmap_size],
                hdr.num_records_per_page,
                after,
            )
        };
        self.buffer_pool.unpin_page(pid, false);
        Ok(pos.map(|p| p as i32))
    }

    fn slot_offset(&self, hdr: &RecordFileHdr, slot_no: i32) -> usize {
        PAGE_HDR_SIZE + hdr.bitmap_size + slot_no as usize * hdr.record_size
    }

    fn check_rid(&self, hdr: &RecordFileHdr, rid: Rid) -> Result<()> {
        if rid.page_no <= 0 || rid.page_no >= hdr.num_pages {
            return Err(Error::PageNotExist {
                fd: self.fd,
                page_no: rid.page_no,
            });
        }
        if rid.slot_no < 0 || rid.slot_no as usize >= hdr.num_records_per_page {
            return Err(Error::RecordNotFound {
                page_no: rid.page_no,
                slot_no: rid.slot_no,
            });
        }
        Ok(())
    }

    /// Allocate and initialize a data page, prepending it to the free
    /// list. The page comes back pinned.
    fn create_page(
        &self,
        hdr: &mut RwLockWriteGuard<RecordFileHdr>,
    ) -> Result<(PageId, Arc<RwLock<Page>>)> {
        let (pid, page) = self.buffer_pool.new_page(self.fd)?;
        {
            let mut page = page.wl();
            let data = page.data_mut();
            set_page_next_free(data, hdr.first_free_page_no);
            set_page_num_records(data, 0);
            bitmap::init(&mut data[PAGE_HDR_SIZE..PAGE_HDR_SIZE + hdr.bitmap_size]);
        }
        hdr.first_free_page_no = pid.page_no;
        hdr.num_pages += 1;
        debug!("record file fd {} grew to page {}", self.fd, pid.page_no);
        Ok((pid, page))
    }
}
