use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::common::{DbConfig, DbError, FrameId, PageId, Result, Timestamp};
use crate::storage::disk::DiskManager;

use super::{FrameData, FrameHeader, ReadPageGuard, ReplacementPolicy, WritePageGuard};

/// Pool state; every field is read and written under one lock.
struct PoolState {
    /// The buffer pool frames
    frames: Vec<FrameHeader>,
    /// Page table: maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Logical clock, bumped on every access
    clock: Timestamp,
    /// Eviction policy, switchable at runtime
    policy: ReplacementPolicy,
}

impl PoolState {
    fn tick(&mut self) -> Timestamp {
        self.clock += 1;
        self.clock
    }

    /// Finds a frame for a new page: the lowest empty frame, else a victim
    /// chosen by the policy among unpinned frames. A dirty victim is written
    /// back before its frame is reset.
    fn target_frame(&mut self, dm: &DiskManager) -> Result<FrameId> {
        if let Some(frame) = self.frames.iter().find(|f| f.page_id().is_none()) {
            return Ok(frame.frame_id());
        }

        let victim = self
            .policy
            .pick_victim(
                self.frames
                    .iter()
                    .filter(|f| f.pin_count() == 0)
                    .map(|f| (f.frame_id(), f.last_access())),
            )
            .ok_or(DbError::BufferPoolExhausted)?;

        let frame = &mut self.frames[victim.as_usize()];
        if let Some(old_page_id) = frame.page_id() {
            if frame.is_dirty() {
                let data = frame.data().read();
                dm.write_page(old_page_id, &data)?;
            }
            debug!("evicted {} from frame {}", old_page_id, victim);
            self.page_table.remove(&old_page_id);
        }
        frame.reset();

        Ok(victim)
    }
}

/// BufferManager caches disk pages in a fixed number of frames.
///
/// Callers obtain a page through [`BufferManager::get_page`] or
/// [`BufferManager::read_page`], which pin it and return a guard. The pin is
/// handed back when the guard is dropped (or explicitly released), and the
/// page is written back only when it is evicted or flushed.
///
/// A thread must not ask for a write guard on a page it already holds a
/// guard for; the second request waits on the first guard's lock.
pub struct BufferManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    page_size: usize,
    state: Mutex<PoolState>,
    disk_manager: Arc<DiskManager>,
}

impl BufferManager {
    /// Creates a BufferManager with `pool_size` frames on top of `disk_manager`.
    pub fn new(
        pool_size: usize,
        policy: ReplacementPolicy,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        let page_size = disk_manager.page_size();
        let frames = (0..pool_size)
            .map(|i| FrameHeader::new(FrameId::new(i as u32), page_size))
            .collect();

        Self {
            pool_size,
            page_size,
            state: Mutex::new(PoolState {
                frames,
                page_table: HashMap::with_capacity(pool_size),
                clock: 0,
                policy,
            }),
            disk_manager,
        }
    }

    /// Creates a BufferManager sized and configured from `config`.
    pub fn from_config(config: &DbConfig, disk_manager: Arc<DiskManager>) -> Self {
        Self::new(config.buffer_count, config.policy, disk_manager)
    }

    /// Pins `page_id` and returns a guard with write access to its bytes.
    ///
    /// If the page is not resident it is read from disk into an empty frame,
    /// or into the frame of a victim when none is empty.
    /// Fails with `BufferPoolExhausted` when every frame is pinned.
    /// Holding a second guard on the same page in the same thread blocks
    /// forever on the frame lock.
    pub fn get_page(&self, page_id: PageId) -> Result<WritePageGuard<'_>> {
        let data = self.pin_page(page_id)?;
        Ok(WritePageGuard::new(page_id, data, self))
    }

    /// Pins `page_id` and returns a guard with read access to its bytes.
    pub fn read_page(&self, page_id: PageId) -> Result<ReadPageGuard<'_>> {
        let data = self.pin_page(page_id)?;
        Ok(ReadPageGuard::new(page_id, data, self))
    }

    /// Releases one pin on `page_id`, marking it dirty if `mark_dirty`.
    ///
    /// Page guards call this on drop. Fails with `InvalidRelease` if the page
    /// is not resident or not pinned.
    pub fn free_page(&self, page_id: PageId, mark_dirty: bool) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(DbError::InvalidRelease(page_id))?;
        let frame = &mut state.frames[frame_id.as_usize()];
        frame.unpin().ok_or(DbError::InvalidRelease(page_id))?;
        if mark_dirty {
            frame.set_dirty(true);
        }
        Ok(())
    }

    /// Writes every dirty page back and empties every frame.
    ///
    /// Nothing is emptied until every dirty page is on disk. If a write fails,
    /// or a dirty page is locked by a live `WritePageGuard`, the error is
    /// returned and every frame stays resident; pages already written are
    /// clean. Frames pinned by read guards are written and emptied too. Their
    /// guards keep a buffer that no longer belongs to the pool, and releasing
    /// them fails silently.
    pub fn flush_all(&self) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut written = 0usize;
        let mut busy = None;

        for frame in state.frames.iter_mut() {
            let Some(page_id) = frame.page_id() else {
                continue;
            };
            if !frame.is_dirty() {
                continue;
            }

            match frame.data().try_read() {
                Some(data) => {
                    self.disk_manager.write_page(page_id, &data)?;
                    written += 1;
                }
                None => {
                    warn!("{} is locked by a live write guard; not flushed", page_id);
                    busy.get_or_insert(page_id);
                    continue;
                }
            }
            frame.set_dirty(false);
        }

        if let Some(page_id) = busy {
            return Err(DbError::PageBusy(page_id));
        }

        for frame in state.frames.iter_mut() {
            let Some(page_id) = frame.page_id() else {
                continue;
            };
            if frame.pin_count() > 0 {
                warn!(
                    "flushing {} while still pinned ({} pins)",
                    page_id,
                    frame.pin_count()
                );
                frame.detach(self.page_size);
            }
            frame.reset();
        }

        state.page_table.clear();
        debug!("flushed buffer pool, {} pages written", written);
        Ok(())
    }

    /// Switches the policy used for future evictions.
    pub fn set_replacement_policy(&self, policy: ReplacementPolicy) {
        self.state.lock().policy = policy;
    }

    pub fn policy(&self) -> ReplacementPolicy {
        self.state.lock().policy
    }

    /// Returns the pin count for a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        self.with_frame(page_id, |f| f.pin_count())
    }

    /// Returns the dirty flag for a resident page.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        self.with_frame(page_id, |f| f.is_dirty())
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of frames not holding any page.
    pub fn free_frame_count(&self) -> usize {
        self.state
            .lock()
            .frames
            .iter()
            .filter(|f| f.page_id().is_none())
            .count()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn with_frame<T>(&self, page_id: PageId, f: impl FnOnce(&FrameHeader) -> T) -> Option<T> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| f(&state.frames[frame_id.as_usize()]))
    }

    /// Pins `page_id`, loading it if needed, and returns its frame's bytes.
    fn pin_page(&self, page_id: PageId) -> Result<FrameData> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = state.tick();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &mut state.frames[frame_id.as_usize()];
            frame.pin();
            frame.touch(now);
            return Ok(Arc::clone(frame.data()));
        }

        let frame_id = state.target_frame(&self.disk_manager)?;
        let frame = &mut state.frames[frame_id.as_usize()];
        {
            let mut data = frame.data().write();
            self.disk_manager.read_page(page_id, &mut data)?;
        }
        frame.load(page_id, now);
        state.page_table.insert(page_id, frame_id);
        debug!("loaded {} into frame {}", page_id, frame_id);

        Ok(Arc::clone(frame.data()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_bm(pool_size: usize, policy: ReplacementPolicy) -> (BufferManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = DbConfig::new(dir.path()).with_page_size(64);
        let dm = Arc::new(DiskManager::new(&config));
        dm.init().unwrap();
        let bm = BufferManager::new(pool_size, policy, dm);
        (bm, dir)
    }

    fn alloc(bm: &BufferManager, n: usize) -> Vec<PageId> {
        (0..n)
            .map(|_| bm.disk_manager().alloc_page().unwrap())
            .collect()
    }

    fn touch(bm: &BufferManager, page_id: PageId) {
        bm.get_page(page_id).unwrap().release().unwrap();
    }

    #[test]
    fn test_buffer_manager_new() {
        let (bm, _dir) = create_bm(4, ReplacementPolicy::Lru);
        assert_eq!(bm.pool_size(), 4);
        assert_eq!(bm.free_frame_count(), 4);
        assert_eq!(bm.page_size(), 64);
        assert_eq!(bm.policy(), ReplacementPolicy::Lru);
    }

    #[test]
    fn test_get_page_pins_and_guard_unpins() {
        let (bm, _dir) = create_bm(2, ReplacementPolicy::Lru);
        let pages = alloc(&bm, 1);

        {
            let guard = bm.read_page(pages[0]).unwrap();
            assert_eq!(guard.page_id(), pages[0]);
            assert_eq!(bm.pin_count(pages[0]), Some(1));
            assert_eq!(bm.free_frame_count(), 1);
        }

        assert_eq!(bm.pin_count(pages[0]), Some(0));
        assert_eq!(bm.is_dirty(pages[0]), Some(false));
    }

    #[test]
    fn test_write_guard_marks_dirty() {
        let (bm, _dir) = create_bm(2, ReplacementPolicy::Lru);
        let pages = alloc(&bm, 2);

        {
            let mut guard = bm.get_page(pages[0]).unwrap();
            guard.data_mut()[0] = 42;
        }
        touch(&bm, pages[1]);

        assert_eq!(bm.is_dirty(pages[0]), Some(true));
        assert_eq!(bm.is_dirty(pages[1]), Some(false));
    }

    #[test]
    fn test_lru_evicts_least_recent() {
        let (bm, _dir) = create_bm(2, ReplacementPolicy::Lru);
        let p = alloc(&bm, 3);

        touch(&bm, p[0]);
        touch(&bm, p[1]);
        touch(&bm, p[0]);
        touch(&bm, p[2]);

        assert!(bm.is_resident(p[0]));
        assert!(!bm.is_resident(p[1]));
        assert!(bm.is_resident(p[2]));
    }

    #[test]
    fn test_mru_evicts_most_recent() {
        let (bm, _dir) = create_bm(2, ReplacementPolicy::Mru);
        let p = alloc(&bm, 3);

        touch(&bm, p[0]);
        touch(&bm, p[1]);
        touch(&bm, p[0]);
        touch(&bm, p[2]);

        assert!(!bm.is_resident(p[0]));
        assert!(bm.is_resident(p[1]));
        assert!(bm.is_resident(p[2]));
    }

    #[test]
    fn test_set_replacement_policy() {
        let (bm, _dir) = create_bm(2, ReplacementPolicy::Lru);
        let p = alloc(&bm, 3);

        touch(&bm, p[0]);
        touch(&bm, p[1]);
        bm.set_replacement_policy(ReplacementPolicy::Mru);
        touch(&bm, p[2]);

        assert!(bm.is_resident(p[0]));
        assert!(!bm.is_resident(p[1]));
    }

    #[test]
    fn test_pool_exhausted_when_all_pinned() {
        let (bm, _dir) = create_bm(2, ReplacementPolicy::Lru);
        let p = alloc(&bm, 3);

        let _g0 = bm.read_page(p[0]).unwrap();
        let _g1 = bm.read_page(p[1]).unwrap();

        assert!(matches!(
            bm.read_page(p[2]),
            Err(DbError::BufferPoolExhausted)
        ));
    }

    #[test]
    fn test_dirty_page_survives_eviction() {
        let (bm, _dir) = create_bm(1, ReplacementPolicy::Lru);
        let p = alloc(&bm, 2);

        {
            let mut guard = bm.get_page(p[0]).unwrap();
            guard.data_mut()[10] = 7;
        }
        touch(&bm, p[1]);
        assert!(!bm.is_resident(p[0]));

        let guard = bm.read_page(p[0]).unwrap();
        assert_eq!(guard.data()[10], 7);
    }

    #[test]
    fn test_free_page_invalid_release() {
        let (bm, _dir) = create_bm(2, ReplacementPolicy::Lru);
        let p = alloc(&bm, 1);

        assert!(matches!(
            bm.free_page(p[0], false),
            Err(DbError::InvalidRelease(_))
        ));

        touch(&bm, p[0]);
        assert!(matches!(
            bm.free_page(p[0], false),
            Err(DbError::InvalidRelease(_))
        ));
    }

    #[test]
    fn test_free_page_direct() {
        let (bm, _dir) = create_bm(2, ReplacementPolicy::Lru);
        let p = alloc(&bm, 1);

        let guard = bm.read_page(p[0]).unwrap();
        let guard2 = bm.read_page(p[0]).unwrap();
        assert_eq!(bm.pin_count(p[0]), Some(2));

        drop(guard);
        guard2.release().unwrap();
        assert_eq!(bm.pin_count(p[0]), Some(0));
    }

    #[test]
    fn test_flush_all_writes_and_empties() {
        let (bm, _dir) = create_bm(2, ReplacementPolicy::Lru);
        let p = alloc(&bm, 1);

        {
            let mut guard = bm.get_page(p[0]).unwrap();
            guard.data_mut()[0] = 99;
        }
        let writes_before = bm.disk_manager().get_num_writes();

        bm.flush_all().unwrap();

        assert_eq!(bm.free_frame_count(), 2);
        assert!(!bm.is_resident(p[0]));
        assert_eq!(bm.disk_manager().get_num_writes(), writes_before + 1);

        let mut buf = vec![0u8; 64];
        bm.disk_manager().read_page(p[0], &mut buf).unwrap();
        assert_eq!(buf[0], 99);
    }

    #[test]
    fn test_flush_all_with_pinned_page() {
        let (bm, _dir) = create_bm(2, ReplacementPolicy::Lru);
        let p = alloc(&bm, 1);

        let guard = bm.read_page(p[0]).unwrap();
        bm.flush_all().unwrap();
        assert_eq!(bm.free_frame_count(), 2);

        // The page is gone from the pool, so handing the pin back fails.
        assert!(matches!(guard.release(), Err(DbError::InvalidRelease(_))));
    }

    #[test]
    fn test_flush_all_refuses_page_under_write_guard() {
        let (bm, _dir) = create_bm(2, ReplacementPolicy::Lru);
        let p = alloc(&bm, 2);

        {
            let mut guard = bm.get_page(p[0]).unwrap();
            guard.data_mut()[0] = 42;
        }
        {
            let mut guard = bm.get_page(p[1]).unwrap();
            guard.data_mut()[0] = 43;
        }

        // Pinned again for writing, but not written through this guard.
        let guard = bm.get_page(p[0]).unwrap();
        assert!(matches!(bm.flush_all(), Err(DbError::PageBusy(id)) if id == p[0]));

        // Both pages stay resident; only the unlocked one went to disk.
        assert!(bm.is_resident(p[0]));
        assert!(bm.is_resident(p[1]));
        assert_eq!(bm.is_dirty(p[0]), Some(true));
        assert_eq!(bm.is_dirty(p[1]), Some(false));
        let mut buf = vec![0u8; 64];
        bm.disk_manager().read_page(p[1], &mut buf).unwrap();
        assert_eq!(buf[0], 43);

        guard.release().unwrap();
        bm.flush_all().unwrap();
        bm.disk_manager().read_page(p[0], &mut buf).unwrap();
        assert_eq!(buf[0], 42);
        assert_eq!(bm.free_frame_count(), 2);
    }

    #[test]
    fn test_flush_all_write_failure_keeps_frames_mapped() {
        let dir = TempDir::new().unwrap();
        let config = DbConfig::new(dir.path())
            .with_page_size(64)
            .with_max_file_count(3)
            .with_max_pages_per_file(1);
        let dm = Arc::new(DiskManager::new(&config));
        dm.init().unwrap();
        let bm = BufferManager::new(3, ReplacementPolicy::Lru, Arc::clone(&dm));
        let p = alloc(&bm, 3);

        for (i, &page_id) in p[..2].iter().enumerate() {
            let mut guard = bm.get_page(page_id).unwrap();
            guard.data_mut()[0] = i as u8 + 1;
        }

        // Shrink Data1.bin behind the manager's back so writing p[1] fails.
        dm.finish().unwrap();
        std::fs::OpenOptions::new()
            .write(true)
            .open(dir.path().join("Data1.bin"))
            .unwrap()
            .set_len(0)
            .unwrap();

        assert!(matches!(bm.flush_all(), Err(DbError::InvalidPageId(id)) if id == p[1]));
        assert!(bm.is_resident(p[0]));
        assert_eq!(bm.is_dirty(p[0]), Some(false));
        assert_eq!(bm.is_dirty(p[1]), Some(true));
        assert_eq!(bm.free_frame_count(), 1);

        // p[0] still owns its frame, so loading p[2] must use the empty one.
        let g0 = bm.read_page(p[0]).unwrap();
        let g2 = bm.read_page(p[2]).unwrap();
        assert_eq!(g0[0], 1);
        assert_eq!(g2[0], 0);
        assert_eq!(bm.pin_count(p[0]), Some(1));
        assert_eq!(bm.pin_count(p[2]), Some(1));
    }

    #[test]
    fn test_mark_dirty_without_writing() {
        let (bm, _dir) = create_bm(2, ReplacementPolicy::Lru);
        let p = alloc(&bm, 1);

        let mut guard = bm.get_page(p[0]).unwrap();
        assert!(!guard.is_dirty());
        guard.mark_dirty();
        assert!(guard.is_dirty());
        guard.release().unwrap();

        assert_eq!(bm.is_dirty(p[0]), Some(true));
        let writes_before = bm.disk_manager().get_num_writes();
        bm.flush_all().unwrap();
        assert_eq!(bm.disk_manager().get_num_writes(), writes_before + 1);
    }
}
