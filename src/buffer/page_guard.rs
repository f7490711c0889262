use std::ops::{Deref, DerefMut};

use log::debug;
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock};

use crate::common::{PageId, Result};

use super::{BufferManager, FrameData};

/// Base page guard that manages the common functionality
struct PageGuardBase<'a> {
    /// The page ID being guarded
    page_id: PageId,
    /// Pool the page is pinned in
    bm: &'a BufferManager,
    /// Whether the pin has already been handed back
    released: bool,
}

impl<'a> PageGuardBase<'a> {
    fn new(page_id: PageId, bm: &'a BufferManager) -> Self {
        Self {
            page_id,
            bm,
            released: false,
        }
    }

    fn release(&mut self, is_dirty: bool) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.bm.free_page(self.page_id, is_dirty)
    }

    fn drop_impl(&mut self, is_dirty: bool) {
        if let Err(e) = self.release(is_dirty) {
            debug!("releasing {} on drop failed: {}", self.page_id, e);
        }
    }
}

/// RAII guard for read-only access to a page.
/// Automatically unpins the page when dropped.
pub struct ReadPageGuard<'a> {
    base: PageGuardBase<'a>,
    /// Read lock on the page data
    data_guard: ArcRwLockReadGuard<RawRwLock, Box<[u8]>>,
}

impl<'a> ReadPageGuard<'a> {
    /// Locks `data` for reading. The page must already be pinned in `bm`.
    pub(crate) fn new(page_id: PageId, data: FrameData, bm: &'a BufferManager) -> Self {
        Self {
            base: PageGuardBase::new(page_id, bm),
            data_guard: data.read_arc(),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.data_guard[..]
    }

    /// Unpins the page now and reports any error, instead of on drop.
    pub fn release(mut self) -> Result<()> {
        self.base.release(false)
    }
}

impl Deref for ReadPageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard<'_> {
    fn drop(&mut self) {
        self.base.drop_impl(false);
    }
}

/// RAII guard for read-write access to a page.
/// Unpins the page when dropped, marking it dirty if it was written through.
pub struct WritePageGuard<'a> {
    base: PageGuardBase<'a>,
    /// Write lock on the page data
    data_guard: ArcRwLockWriteGuard<RawRwLock, Box<[u8]>>,
    /// Whether the page was modified through this guard
    is_dirty: bool,
}

impl<'a> WritePageGuard<'a> {
    /// Locks `data` for writing. The page must already be pinned in `bm`.
    pub(crate) fn new(page_id: PageId, data: FrameData, bm: &'a BufferManager) -> Self {
        Self {
            base: PageGuardBase::new(page_id, bm),
            data_guard: data.write_arc(),
            is_dirty: false,
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.data_guard[..]
    }

    /// Returns a mutable reference to the page data.
    /// Automatically marks the page as dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.data_guard[..]
    }

    /// Marks the page dirty without touching its bytes.
    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Unpins the page now and reports any error, instead of on drop.
    pub fn release(mut self) -> Result<()> {
        let is_dirty = self.is_dirty;
        self.base.release(is_dirty)
    }
}

impl Deref for WritePageGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard<'_> {
    fn drop(&mut self) {
        let is_dirty = self.is_dirty;
        self.base.drop_impl(is_dirty);
    }
}
