use crate::common::{PageId, PAGE_ID_SIZE};

/// Data page layout:
///
/// +---------------------+  0
/// | prev   (PageId)     |
/// +---------------------+  8
/// | next   (PageId)     |
/// +---------------------+  16
/// | slot_count (u32 BE) |
/// +---------------------+  20
/// | bitmap              |  slot_count bytes, 0 = free, 1 = used
/// +---------------------+  20 + slot_count
/// | record area         |  slot_count * record_size bytes
/// +---------------------+
///
/// `prev`/`next` link the page inside whichever list (full or not-full) of
/// its relation currently holds it.
const PREV_OFFSET: usize = 0;
const NEXT_OFFSET: usize = PREV_OFFSET + PAGE_ID_SIZE;
const SLOT_COUNT_OFFSET: usize = NEXT_OFFSET + PAGE_ID_SIZE;
const BITMAP_OFFSET: usize = SLOT_COUNT_OFFSET + 4;

/// Fixed bytes in front of the bitmap.
pub const DATA_PAGE_HEADER_SIZE: usize = BITMAP_OFFSET;

const SLOT_FREE: u8 = 0;
const SLOT_USED: u8 = 1;

/// View over the bytes of a heap data page.
pub struct DataPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> DataPage<B> {
    /// Creates a view over the given page bytes.
    pub fn new(data: B) -> Self {
        assert!(data.as_ref().len() >= DATA_PAGE_HEADER_SIZE);
        Self { data }
    }

    /// Returns the number of slots that fit on a page of `page_size` bytes
    /// for records of `record_size` bytes (one bitmap byte per slot).
    pub fn slots_for(page_size: usize, record_size: usize) -> usize {
        page_size.saturating_sub(DATA_PAGE_HEADER_SIZE) / (1 + record_size)
    }

    pub fn prev(&self) -> Option<PageId> {
        PageId::read_from(&self.data.as_ref()[PREV_OFFSET..])
    }

    pub fn next(&self) -> Option<PageId> {
        PageId::read_from(&self.data.as_ref()[NEXT_OFFSET..])
    }

    /// Returns the number of slots stored in the page header.
    pub fn slot_count(&self) -> usize {
        let d = self.data.as_ref();
        u32::from_be_bytes([
            d[SLOT_COUNT_OFFSET],
            d[SLOT_COUNT_OFFSET + 1],
            d[SLOT_COUNT_OFFSET + 2],
            d[SLOT_COUNT_OFFSET + 3],
        ]) as usize
    }

    /// True if the header's slot count and the record area fit in the page.
    pub fn fits(&self, record_size: usize) -> bool {
        let needed = BITMAP_OFFSET + self.slot_count() * (1 + record_size);
        needed <= self.data.as_ref().len()
    }

    fn bitmap(&self) -> &[u8] {
        &self.data.as_ref()[BITMAP_OFFSET..BITMAP_OFFSET + self.slot_count()]
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        self.bitmap()[slot] != SLOT_FREE
    }

    /// Returns the lowest free slot, if any.
    pub fn first_free_slot(&self) -> Option<usize> {
        self.bitmap().iter().position(|&b| b == SLOT_FREE)
    }

    pub fn is_full(&self) -> bool {
        self.first_free_slot().is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap().iter().all(|&b| b == SLOT_FREE)
    }

    /// Iterates over occupied slots in increasing order.
    pub fn used_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.bitmap()
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b != SLOT_FREE)
            .map(|(i, _)| i)
    }

    /// Byte offset of `slot`'s record inside the page.
    pub fn record_offset(&self, slot: usize, record_size: usize) -> usize {
        BITMAP_OFFSET + self.slot_count() + slot * record_size
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> DataPage<B> {
    /// Formats a fresh data page: unlinked, `slot_count` free slots.
    pub fn init(&mut self, slot_count: usize) {
        self.data.as_mut().fill(0);
        self.set_prev(None);
        self.set_next(None);
        let bytes = (slot_count as u32).to_be_bytes();
        self.data.as_mut()[SLOT_COUNT_OFFSET..SLOT_COUNT_OFFSET + 4].copy_from_slice(&bytes);
    }

    pub fn set_prev(&mut self, page_id: Option<PageId>) {
        PageId::write_to(page_id, &mut self.data.as_mut()[PREV_OFFSET..]);
    }

    pub fn set_next(&mut self, page_id: Option<PageId>) {
        PageId::write_to(page_id, &mut self.data.as_mut()[NEXT_OFFSET..]);
    }

    /// Marks `slot` used or free.
    pub fn set_slot(&mut self, slot: usize, used: bool) {
        let offset = BITMAP_OFFSET + slot;
        self.data.as_mut()[offset] = if used { SLOT_USED } else { SLOT_FREE };
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }
}
