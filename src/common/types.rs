use std::fmt;

/// Page identifier - a page is addressed by the data file it lives in and
/// its index inside that file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub file_idx: u32,
    pub page_idx: u32,
}

impl PageId {
    pub fn new(file_idx: u32, page_idx: u32) -> Self {
        Self { file_idx, page_idx }
    }

    /// Encodes an optional page pointer as 8 bytes (file index, page index),
    /// each a big-endian `i32`. `None` is written as `(-1, -1)`.
    pub fn write_to(page_id: Option<PageId>, buf: &mut [u8]) {
        let (file_idx, page_idx) = match page_id {
            Some(pid) => (pid.file_idx as i32, pid.page_idx as i32),
            None => (NULL_PAGE_IDX, NULL_PAGE_IDX),
        };
        buf[0..4].copy_from_slice(&file_idx.to_be_bytes());
        buf[4..8].copy_from_slice(&page_idx.to_be_bytes());
    }

    /// Decodes a pointer written by [`PageId::write_to`].
    pub fn read_from(buf: &[u8]) -> Option<PageId> {
        let file_idx = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let page_idx = i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if file_idx < 0 || page_idx < 0 {
            None
        } else {
            Some(PageId::new(file_idx as u32, page_idx as u32))
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageId({},{})", self.file_idx, self.page_idx)
    }
}

/// Size in bytes of an encoded page pointer.
pub const PAGE_ID_SIZE: usize = 8;

const NULL_PAGE_IDX: i32 = -1;

/// Frame identifier type - identifies a buffer frame in the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

impl FrameId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({})", self.0)
    }
}

/// Record identifier - the data page holding the record and its slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_idx: u32,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_idx: u32) -> Self {
        Self { page_id, slot_idx }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({}, slot {})", self.page_id, self.slot_idx)
    }
}

/// Logical clock value used for recency tracking in the buffer pool
pub type Timestamp = u64;
