use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, info};
use parking_lot::Mutex;

use crate::common::{DbConfig, DbError, PageId, Result};

/// Name of the file holding the free-page queue between runs.
const FREE_LIST_FILE: &str = "dm.save";

/// Mutable state of the disk manager, guarded by a single lock.
#[derive(Default)]
struct DiskState {
    /// Open handle per data file, indexed by file index (None = not created yet)
    files: Vec<Option<File>>,
    /// Number of pages each data file currently holds
    page_counts: Vec<u32>,
    /// Deallocated pages waiting to be reused, oldest first
    free_pages: VecDeque<PageId>,
    /// Whether the directory has been scanned since the last finish()
    loaded: bool,
}

/// DiskManager is responsible for reading and writing pages to/from disk.
///
/// Pages are spread over at most `max_file_count` files named
/// `Data{i}.bin` inside the database directory. Each file grows one page at
/// a time up to `max_pages_per_file` pages. Page `(f, p)` lives in file `f`
/// at byte offset `p * page_size`.
///
/// Deallocated pages are queued and handed out again in FIFO order before
/// any file is extended.
pub struct DiskManager {
    /// Directory holding the data files
    db_path: PathBuf,
    page_size: usize,
    max_file_count: u32,
    max_pages_per_file: u32,
    state: Mutex<DiskState>,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Creates a DiskManager for the directory and limits in `config`.
    /// Nothing touches the filesystem until [`DiskManager::init`] or the
    /// first page operation.
    pub fn new(config: &DbConfig) -> Self {
        Self {
            db_path: config.db_path.clone(),
            page_size: config.page_size,
            max_file_count: config.max_file_count,
            max_pages_per_file: config.max_pages_per_file,
            state: Mutex::new(DiskState::default()),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        }
    }

    /// Creates the database directory if needed, opens the existing data
    /// files and restores the free-page queue saved by the last `finish()`.
    /// Calling it again before `finish()` has no effect.
    pub fn init(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state)
    }

    /// Persists the free-page queue, syncs and closes every data file.
    /// Calling it on a closed manager has no effect.
    pub fn finish(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.loaded {
            return Ok(());
        }

        let mut saved = String::new();
        for pid in &state.free_pages {
            saved.push_str(&format!("{},{}\n", pid.file_idx, pid.page_idx));
        }
        fs::write(self.db_path.join(FREE_LIST_FILE), saved)?;

        for file in state.files.iter().flatten() {
            file.sync_all()?;
        }
        info!(
            "disk manager closed {} with {} free pages",
            self.db_path.display(),
            state.free_pages.len()
        );
        *state = DiskState::default();
        Ok(())
    }

    /// Allocates a page and returns its id.
    ///
    /// A previously deallocated page is reused first (oldest first).
    /// Otherwise the first file below its page limit is extended by one
    /// zeroed page.
    pub fn alloc_page(&self) -> Result<PageId> {
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state)?;

        if let Some(page_id) = state.free_pages.pop_front() {
            debug!("reusing deallocated page {}", page_id);
            return Ok(page_id);
        }

        for file_idx in 0..self.max_file_count {
            let idx = file_idx as usize;
            if state.page_counts[idx] >= self.max_pages_per_file {
                continue;
            }

            let page_idx = state.page_counts[idx];
            let new_len = (page_idx as u64 + 1) * self.page_size as u64;
            let file = self.open_data_file(&mut state, file_idx)?;
            file.set_len(new_len)?;
            state.page_counts[idx] = page_idx + 1;

            let page_id = PageId::new(file_idx, page_idx);
            debug!("extended Data{}.bin with page {}", file_idx, page_id);
            return Ok(page_id);
        }

        Err(DbError::OutOfSpace)
    }

    /// Reads a page from disk into `data`, which must hold at least
    /// `page_size` bytes. Only the first `page_size` bytes are written.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state)?;
        self.check_page(&state, page_id, data.len())?;

        let offset = self.offset_of(page_id);
        let file = self.open_data_file(&mut state, page_id.file_idx)?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut data[..self.page_size])?;

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes the first `page_size` bytes of `data` to the page on disk.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state)?;
        self.check_page(&state, page_id, data.len())?;

        let offset = self.offset_of(page_id);
        let file = self.open_data_file(&mut state, page_id.file_idx)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&data[..self.page_size])?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Queues a page for reuse. The page contents are left as they are;
    /// whoever allocates it next re-initializes it.
    ///
    /// Deallocating a page that is already queued is a caller error and is
    /// not detected.
    pub fn dealloc_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state)?;
        self.check_page(&state, page_id, self.page_size)?;

        state.free_pages.push_back(page_id);
        debug!("deallocated page {}", page_id);
        Ok(())
    }

    /// Returns the configured page size.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the database directory.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Returns how many pages the given data file holds.
    pub fn page_count(&self, file_idx: u32) -> u32 {
        let state = self.state.lock();
        state.page_counts.get(file_idx as usize).copied().unwrap_or(0)
    }

    /// Returns the number of deallocated pages waiting for reuse.
    pub fn free_page_count(&self) -> usize {
        self.state.lock().free_pages.len()
    }

    /// Returns the number of pages currently handed out.
    pub fn allocated_page_count(&self) -> usize {
        let state = self.state.lock();
        let total: u32 = state.page_counts.iter().sum();
        (total as usize).saturating_sub(state.free_pages.len())
    }

    /// Returns the number of disk reads performed.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of disk writes performed.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    fn data_file_path(&self, file_idx: u32) -> PathBuf {
        self.db_path.join(format!("Data{}.bin", file_idx))
    }

    fn offset_of(&self, page_id: PageId) -> u64 {
        page_id.page_idx as u64 * self.page_size as u64
    }

    fn check_page(&self, state: &DiskState, page_id: PageId, buf_len: usize) -> Result<()> {
        let allocated = state
            .page_counts
            .get(page_id.file_idx as usize)
            .is_some_and(|&count| page_id.page_idx < count);
        if !allocated || buf_len < self.page_size {
            return Err(DbError::InvalidPageId(page_id));
        }
        Ok(())
    }

    fn open_data_file<'a>(&self, state: &'a mut DiskState, file_idx: u32) -> Result<&'a mut File> {
        let slot = &mut state.files[file_idx as usize];
        let file = match slot.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(self.data_file_path(file_idx))?,
        };
        Ok(slot.insert(file))
    }

    fn ensure_loaded(&self, state: &mut DiskState) -> Result<()> {
        if state.loaded {
            return Ok(());
        }

        fs::create_dir_all(&self.db_path)?;

        let mut files = Vec::with_capacity(self.max_file_count as usize);
        let mut page_counts = Vec::with_capacity(self.max_file_count as usize);
        for file_idx in 0..self.max_file_count {
            let path = self.data_file_path(file_idx);
            if path.exists() {
                let file = OpenOptions::new().read(true).write(true).open(&path)?;
                let len = file.metadata()?.len();
                page_counts.push((len / self.page_size as u64) as u32);
                files.push(Some(file));
            } else {
                page_counts.push(0);
                files.push(None);
            }
        }

        let mut free_pages = VecDeque::new();
        let saved = self.db_path.join(FREE_LIST_FILE);
        if saved.exists() {
            for line in fs::read_to_string(&saved)?.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let page_id = parse_saved_page_id(line).ok_or_else(|| {
                    DbError::FreeList(format!("malformed entry '{}' in {}", line, FREE_LIST_FILE))
                })?;
                let known = page_counts
                    .get(page_id.file_idx as usize)
                    .is_some_and(|&count| page_id.page_idx < count);
                if known {
                    free_pages.push_back(page_id);
                }
            }
        }

        info!(
            "disk manager opened {} ({} pages on disk, {} free)",
            self.db_path.display(),
            page_counts.iter().sum::<u32>(),
            free_pages.len()
        );

        *state = DiskState {
            files,
            page_counts,
            free_pages,
            loaded: true,
        };
        Ok(())
    }
}

fn parse_saved_page_id(line: &str) -> Option<PageId> {
    let (file_idx, page_idx) = line.split_once(',')?;
    Some(PageId::new(
        file_idx.trim().parse().ok()?,
        page_idx.trim().parse().ok()?,
    ))
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        // Ensure all data is flushed to disk
        for file in self.state.get_mut().files.iter().flatten() {
            let _ = file.sync_all();
        }
    }
}
