use std::fmt;

pub const PAGE_SIZE: usize = 4096;

/// Sentinel page number: "no such page".
pub const INVALID_PAGE_ID: i32 = -1;

/// Identity of a page on disk: the file it lives in and its position
/// within that file.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId {
    pub fd: i32,
    pub page_no: i32,
}

impl PageId {
    pub fn new(fd: i32, page_no: i32) -> Self {
        Self { fd, page_no }
    }
}

impl fmt::Debug for PageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "page_{}_{}", self.fd, self.page_no)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A fixed-size page image held by the buffer pool. Pin counting and the
/// dirty flag live in the pool's frame table, not here; the page itself is
/// just identity plus bytes.
pub struct Page {
    id: PageId,
    data: [u8; PAGE_SIZE],
}

impl Page {
    pub fn new(id: PageId) -> Self {
        Self {
            id,
            data: [0; PAGE_SIZE],
        }
    }

    pub fn get_id(&self) -> PageId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
