use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::{FrameId, PageId, Timestamp};

/// Shared handle to the bytes of one frame. Page guards lock it directly so
/// the pool lock is not held while a caller works on the page.
pub type FrameData = Arc<RwLock<Box<[u8]>>>;

/// FrameHeader manages a single buffer frame in the buffer pool.
/// It stores metadata about the frame and the actual page data.
///
/// All metadata is mutated under the buffer pool lock, so plain fields are
/// enough here.
pub struct FrameHeader {
    /// The frame ID (index in the buffer pool)
    frame_id: FrameId,
    /// The page stored in this frame (None if empty)
    page_id: Option<PageId>,
    /// Number of outstanding users of the page
    pin_count: u32,
    /// Whether the page has been modified since being read from disk
    is_dirty: bool,
    /// Logical time of the last access, for LRU/MRU
    last_access: Timestamp,
    /// The page bytes
    data: FrameData,
}

impl FrameHeader {
    /// Creates an empty frame holding a zeroed buffer of `page_size` bytes.
    pub fn new(frame_id: FrameId, page_size: usize) -> Self {
        Self {
            frame_id,
            page_id: None,
            pin_count: 0,
            is_dirty: false,
            last_access: 0,
            data: Arc::new(RwLock::new(vec![0u8; page_size].into_boxed_slice())),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> Option<PageId> {
        self.page_id
    }

    /// Binds the frame to a freshly loaded page: pinned once, clean.
    pub fn load(&mut self, page_id: PageId, now: Timestamp) {
        self.page_id = Some(page_id);
        self.pin_count = 1;
        self.is_dirty = false;
        self.last_access = now;
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&mut self) -> u32 {
        self.pin_count += 1;
        self.pin_count
    }

    /// Decrements the pin count and returns the new value.
    /// Returns None if the pin count was already 0.
    pub fn unpin(&mut self) -> Option<u32> {
        if self.pin_count == 0 {
            return None;
        }
        self.pin_count -= 1;
        Some(self.pin_count)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.is_dirty = dirty;
    }

    pub fn last_access(&self) -> Timestamp {
        self.last_access
    }

    /// Records an access at logical time `now`.
    pub fn touch(&mut self, now: Timestamp) {
        self.last_access = now;
    }

    pub fn data(&self) -> &FrameData {
        &self.data
    }

    /// Gives the frame a new buffer, leaving the old one to whoever still
    /// holds it.
    pub fn detach(&mut self, page_size: usize) {
        self.data = Arc::new(RwLock::new(vec![0u8; page_size].into_boxed_slice()));
    }

    /// Resets the frame to its initial state.
    pub fn reset(&mut self) {
        self.page_id = None;
        self.pin_count = 0;
        self.is_dirty = false;
        self.last_access = 0;
    }
}
