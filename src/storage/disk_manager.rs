use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicI32, Ordering},
        Mutex, RwLock,
    },
};

use log::debug;

use crate::{
    error::{Error, Result},
    storage::page::PAGE_SIZE,
    utils::HandyRwLock,
};

struct FileEntry {
    file: Mutex<File>,
    path: PathBuf,
    // next page number to hand out for this file
    next_page_no: AtomicI32,
}

/// Owns every open paged file. Callers address files by the fd this
/// manager assigned at `open_file` time; page I/O goes through the
/// per-file mutex so concurrent seek/read pairs stay atomic.
pub struct DiskManager {
    files: RwLock<HashMap<i32, FileEntry>>,
    open_paths: RwLock<HashMap<PathBuf, i32>>,
    next_fd: AtomicI32,
}

impl DiskManager {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            open_paths: RwLock::new(HashMap::new()),
            next_fd: AtomicI32::new(0),
        }
    }

    pub fn is_file(&self, path: impl AsRef<Path>) -> bool {
        path.as_ref().is_file()
    }

    pub fn create_file(&self, path: impl AsRef<Path>) -> Result<()> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;
        Ok(())
    }

    /// Open a paged file and return its fd. The per-file page counter is
    /// seeded from the current file length.
    pub fn open_file(&self, path: impl AsRef<Path>) -> Result<i32> {
        let path = path.as_ref().to_path_buf();
        if let Some(fd) = self.open_paths.rl().get(&path) {
            return Ok(*fd);
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        let pages = (len as usize / PAGE_SIZE) as i32;

        let fd = self.next_fd.fetch_add(1, Ordering::SeqCst);
        self.files.wl().insert(
            fd,
            FileEntry {
                file: Mutex::new(file),
                path: path.clone(),
                next_page_no: AtomicI32::new(pages),
            },
        );
        self.open_paths.wl().insert(path, fd);
        debug!("opened fd {} with {} pages", fd, pages);
        Ok(fd)
    }

    pub fn close_file(&self, fd: i32) -> Result<()> {
        let entry = self.files.wl().remove(&fd).ok_or_else(|| {
            Error::Unix(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("fd {} is not open", fd),
            ))
        })?;
        self.open_paths.wl().remove(&entry.path);
        Ok(())
    }

    /// Remove a file from disk. The file must not be open.
    pub fn destroy_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        if self.open_paths.rl().contains_key(&path) {
            return Err(Error::Unix(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{:?} is still open", path),
            )));
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    pub fn read_page(&self, fd: i32, page_no: i32, buf: &mut [u8]) -> Result<()> {
        let files = self.files.rl();
        let entry = Self::entry(&files, fd, page_no)?;
        if page_no < 0 || page_no >= entry.next_page_no.load(Ordering::SeqCst) {
            return Err(Error::PageNotExist { fd, page_no });
        }
        let mut file = entry.file.lock().unwrap();
        file.seek(SeekFrom::Start(page_no as u64 * PAGE_SIZE as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_page(&self, fd: i32, page_no: i32, buf: &[u8]) -> Result<()> {
        let files = self.files.rl();
        let entry = Self::entry(&files, fd, page_no)?;
        if page_no < 0 {
            return Err(Error::PageNotExist { fd, page_no });
        }
        let mut file = entry.file.lock().unwrap();
        file.seek(SeekFrom::Start(page_no as u64 * PAGE_SIZE as u64))?;
        file.write_all(buf)?;
        Ok(())
    }

    /// Hand out the next page number of the file. The page contents are
    /// not touched until the first `write_page`.
    pub fn allocate_page(&self, fd: i32) -> Result<i32> {
        let files = self.files.rl();
        let entry = Self::entry(&files, fd, 0)?;
        Ok(entry.next_page_no.fetch_add(1, Ordering::SeqCst))
    }

    pub fn get_page_count(&self, fd: i32) -> Result<i32> {
        let files = self.files.rl();
        let entry = Self::entry(&files, fd, 0)?;
        Ok(entry.next_page_no.load(Ordering::SeqCst))
    }

    pub fn set_page_count(&self, fd: i32, page_count: i32) -> Result<()> {
        let files = self.files.rl();
        let entry = Self::entry(&files, fd, 0)?;
        entry.next_page_no.store(page_count, Ordering::SeqCst);
        Ok(())
    }

    fn entry<'a>(
        files: &'a HashMap<i32, FileEntry>,
        fd: i32,
        page_no: i32,
    ) -> Result<&'a FileEntry> {
        files.get(&fd).ok_or(Error::PageNotExist { fd, page_no })
    }
}

impl Default for DiskManager {
    fn default() -> Self {
        Self::new()
    }
}
