use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use log::debug;

use crate::{
    error::{Error, Result},
    storage::{
        disk_manager::DiskManager,
        page::{Page, PageId},
    },
    utils::HandyRwLock,
};

pub const DEFAULT_POOL_SIZE: usize = 256;

struct Frame {
    page: Arc<RwLock<Page>>,
    pin_count: usize,
    dirty: bool,
}

/// Caches disk pages in memory. Pages are handed out pinned; every caller
/// must pair each fetch/new with an `unpin_page` on every exit path, with
/// `dirty = true` iff it wrote. Unpinning a dirty page only makes it
/// eligible for writeback, it is not a flush.
///
/// The victim choice on a full pool is any unpinned frame; the replacement
/// policy is deliberately not part of this module's contract.
pub struct BufferPool {
    pool_size: usize,
    disk_manager: Arc<DiskManager>,
    frames: Mutex<HashMap<PageId, Frame>>,
}

impl BufferPool {
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self {
            pool_size,
            disk_manager,
            frames: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Fetch a page, reading it from disk on a miss. The returned page is
    /// pinned.
    pub fn fetch_page(&self, pid: PageId) -> Result<Arc<RwLock<Page>>> {
        let mut frames = self.frames.lock().unwrap();

        if let Some(frame) = frames.get_mut(&pid) {
            frame.pin_count += 1;
            return Ok(Arc::clone(&frame.page));
        }

        if frames.len() >= self.pool_size {
            self.evict_one(&mut frames)?;
        }

        let mut page = Page::new(pid);
        self.disk_manager
            .read_page(pid.fd, pid.page_no, page.data_mut())?;

        let page = Arc::new(RwLock::new(page));
        frames.insert(
            pid,
            Frame {
                page: Arc::clone(&page),
                pin_count: 1,
                dirty: false,
            },
        );
        Ok(page)
    }

    /// Allocate a fresh zero-filled page in `fd` and pin it.
    pub fn new_page(&self, fd: i32) -> Result<(PageId, Arc<RwLock<Page>>)> {
        let mut frames = self.frames.lock().unwrap();
        if frames.len() >= self.pool_size {
            self.evict_one(&mut frames)?;
        }

        let page_no = self.disk_manager.allocate_page(fd)?;
        let pid = PageId::new(fd, page_no);

        let page = Arc::new(RwLock::new(Page::new(pid)));
        frames.insert(
            pid,
            Frame {
                page: Arc::clone(&page),
                pin_count: 1,
                // a new page must reach disk even if nobody writes to it
                dirty: true,
            },
        );
        Ok((pid, page))
    }

    /// Drop one pin. Returns false when the page is not resident.
    pub fn unpin_page(&self, pid: PageId, dirty: bool) -> bool {
        let mut frames = self.frames.lock().unwrap();
        match frames.get_mut(&pid) {
            Some(frame) => {
                if frame.pin_count > 0 {
                    frame.pin_count -= 1;
                }
                frame.dirty |= dirty;
                true
            }
            None => false,
        }
    }

    /// Discard a resident page without writing it back. The on-disk page
    /// number is not recycled.
    pub fn delete_page(&self, pid: PageId) -> Result<()> {
        let mut frames = self.frames.lock().unwrap();
        if let Some(frame) = frames.get(&pid) {
            if frame.pin_count > 0 {
                return Err(Error::BufferPoolFull);
            }
            frames.remove(&pid);
        }
        Ok(())
    }

    pub fn flush_page(&self, pid: PageId) -> Result<()> {
        let mut frames = self.frames.lock().unwrap();
        if let Some(frame) = frames.get_mut(&pid) {
            let page = frame.page.rl();
            self.disk_manager
                .write_page(pid.fd, pid.page_no, page.data())?;
            drop(page);
            frame.dirty = false;
        }
        Ok(())
    }

    /// Write back every dirty frame belonging to `fd`. Used by file close
    /// paths; transaction commit never calls this.
    pub fn flush_all_pages(&self, fd: i32) -> Result<()> {
        let mut frames = self.frames.lock().unwrap();
        for (pid, frame) in frames.iter_mut() {
            if pid.fd == fd && frame.dirty {
                let page = frame.page.rl();
                self.disk_manager
                    .write_page(pid.fd, pid.page_no, page.data())?;
                drop(page);
                frame.dirty = false;
            }
        }
        Ok(())
    }

    /// Drop every frame belonging to `fd`, flushing dirty ones first.
    pub fn evict_all_pages(&self, fd: i32) -> Result<()> {
        self.flush_all_pages(fd)?;
        let mut frames = self.frames.lock().unwrap();
        frames.retain(|pid, _| pid.fd != fd);
        Ok(())
    }

    fn evict_one(&self, frames: &mut HashMap<PageId, Frame>) -> Result<()> {
        let victim = frames
            .iter()
            .find(|(_, frame)| frame.pin_count == 0)
            .map(|(pid, _)| *pid)
            .ok_or(Error::BufferPoolFull)?;

        let frame = frames.remove(&victim).unwrap();
        if frame.dirty {
            let page = frame.page.rl();
            self.disk_manager
                .write_page(victim.fd, victim.page_no, page.data())?;
        }
        debug!("evicted {}", victim);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::PAGE_SIZE;

    fn setup(name: &str) -> (Arc<DiskManager>, BufferPool, std::path::PathBuf) {
        let path =
            std::env::temp_dir().join(format!("minirel_bp_{}_{}", std::process::id(), name));
        let _ = std::fs::remove_file(&path);
        let disk_manager = Arc::new(DiskManager::new());
        disk_manager.create_file(&path).unwrap();
        let pool = BufferPool::new(4, Arc::clone(&disk_manager));
        (disk_manager, pool, path)
    }

    #[test]
    fn test_new_fetch_unpin() {
        let (disk_manager, pool, path) = setup("new_fetch");
        let fd = disk_manager.open_file(&path).unwrap();

        let (pid, page) = pool.new_page(fd).unwrap();
        page.wl().data_mut()[0] = 42;
        drop(page);
        assert!(pool.unpin_page(pid, true));

        let page = pool.fetch_page(pid).unwrap();
        assert_eq!(page.rl().data()[0], 42);
        drop(page);
        assert!(pool.unpin_page(pid, false));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_eviction_writes_back() {
        let (disk_manager, _, path) = setup("evict");
        // a single frame makes the victim deterministic
        let pool = BufferPool::new(1, Arc::clone(&disk_manager));
        let fd = disk_manager.open_file(&path).unwrap();

        let (first_pid, page) = pool.new_page(fd).unwrap();
        page.wl().data_mut()[7] = 7;
        drop(page);
        pool.unpin_page(first_pid, true);

        // the next page forces the first one out and onto disk
        let (pid, _page) = pool.new_page(fd).unwrap();
        pool.unpin_page(pid, false);

        let mut buf = [0u8; PAGE_SIZE];
        disk_manager.read_page(fd, first_pid.page_no, &mut buf).unwrap();
        assert_eq!(buf[7], 7);

        // and fetching it again reads the written bytes back in
        let page = pool.fetch_page(first_pid).unwrap();
        assert_eq!(page.rl().data()[7], 7);
        drop(page);
        pool.unpin_page(first_pid, false);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_all_pinned_is_an_error() {
        let (disk_manager, pool, path) = setup("pinned");
        let fd = disk_manager.open_file(&path).unwrap();

        for _ in 0..4 {
            pool.new_page(fd).unwrap();
        }
        match pool.new_page(fd) {
            Err(Error::BufferPoolFull) => {}
            other => panic!("expected BufferPoolFull, got {:?}", other.map(|_| ())),
        }

        let _ = std::fs::remove_file(&path);
    }
}
