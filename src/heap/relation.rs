use std::collections::HashSet;
use std::sync::Arc;

use log::debug;

use crate::buffer::BufferManager;
use crate::common::{DbError, PageId, RecordId, Result};
use crate::storage::disk::DiskManager;
use crate::storage::page::{DataPage, HeaderPage};
use crate::tuple::{self, ColumnInfo, Record};

/// The two page lists rooted in a relation's header page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageList {
    Full,
    NotFull,
}

/// A heap file holding the records of one table.
///
/// The relation owns a header page with the heads of two doubly linked
/// lists of data pages: pages with no free slot (full) and pages with at
/// least one (not-full). Every data page of the relation is on exactly one
/// of them. Records have a fixed size derived from the columns, so each data
/// page holds the same number of slots.
///
/// Operations pin at most one page at a time and release it (dirty if
/// written) before moving to the next one. A multi-page update is not
/// atomic: an error halfway through can leave the lists inconsistent.
pub struct Relation {
    name: String,
    columns: Vec<ColumnInfo>,
    header_page_id: PageId,
    record_size: usize,
    slots_per_page: usize,
    disk_manager: Arc<DiskManager>,
    buffer_manager: Arc<BufferManager>,
}

impl Relation {
    /// Creates a relation with a freshly allocated header page and no data
    /// pages.
    pub fn create(
        name: impl Into<String>,
        columns: Vec<ColumnInfo>,
        disk_manager: Arc<DiskManager>,
        buffer_manager: Arc<BufferManager>,
    ) -> Result<Self> {
        let (record_size, slots_per_page) = layout(&columns, buffer_manager.page_size())?;
        let header_page_id = disk_manager.alloc_page()?;

        let mut guard = buffer_manager.get_page(header_page_id)?;
        HeaderPage::new(guard.data_mut()).init();
        guard.release()?;

        let name = name.into();
        debug!(
            "created relation {} with header page {} ({} slots of {} bytes)",
            name, header_page_id, slots_per_page, record_size
        );

        Ok(Self {
            name,
            columns,
            header_page_id,
            record_size,
            slots_per_page,
            disk_manager,
            buffer_manager,
        })
    }

    /// Reopens a relation whose header page already exists, e.g. when
    /// loading the catalog. A header that was never written is initialized
    /// to empty lists.
    pub fn open(
        name: impl Into<String>,
        columns: Vec<ColumnInfo>,
        header_page_id: PageId,
        disk_manager: Arc<DiskManager>,
        buffer_manager: Arc<BufferManager>,
    ) -> Result<Self> {
        let (record_size, slots_per_page) = layout(&columns, buffer_manager.page_size())?;

        let mut guard = buffer_manager.get_page(header_page_id)?;
        if HeaderPage::new(guard.data()).is_uninitialized() {
            HeaderPage::new(guard.data_mut()).init();
        }
        guard.release()?;

        Ok(Self {
            name: name.into(),
            columns,
            header_page_id,
            record_size,
            slots_per_page,
            disk_manager,
            buffer_manager,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    /// Size in bytes of one encoded record.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Number of record slots on each data page.
    pub fn slots_per_page(&self) -> usize {
        self.slots_per_page
    }

    /// First page of the full list.
    pub fn full_head(&self) -> Result<Option<PageId>> {
        self.head(PageList::Full)
    }

    /// First page of the not-full list.
    pub fn not_full_head(&self) -> Result<Option<PageId>> {
        self.head(PageList::NotFull)
    }

    /// Allocates an empty data page and links it at the head of the
    /// not-full list.
    pub fn add_data_page(&self) -> Result<PageId> {
        let page_id = self.disk_manager.alloc_page()?;
        let old_head = self.not_full_head()?;

        let mut guard = self.buffer_manager.get_page(page_id)?;
        let mut page = DataPage::new(guard.data_mut());
        page.init(self.slots_per_page);
        page.set_next(old_head);
        guard.release()?;

        if let Some(old_head) = old_head {
            self.set_prev(old_head, Some(page_id))?;
        }
        self.set_head(PageList::NotFull, Some(page_id))?;

        debug!("{}: added data page {}", self.name, page_id);
        Ok(page_id)
    }

    /// Returns a data page with at least one free slot, if any.
    pub fn get_free_data_page_id(&self) -> Result<Option<PageId>> {
        for page_id in self.list_pages(PageList::NotFull)? {
            let guard = self.buffer_manager.read_page(page_id)?;
            if !DataPage::new(guard.data()).is_full() {
                return Ok(Some(page_id));
            }
        }
        Ok(None)
    }

    /// Writes `record` into the lowest free slot of `page_id`.
    ///
    /// Fails with `PageFull` if the page has no free slot. A page that
    /// becomes full moves from the not-full list to the head of the full list.
    pub fn write_record_to_data_page<S: AsRef<str>>(
        &self,
        record: &[S],
        page_id: PageId,
    ) -> Result<RecordId> {
        let mut guard = self.buffer_manager.get_page(page_id)?;
        self.check_data_page(page_id, guard.data())?;

        let slot = DataPage::new(guard.data())
            .first_free_slot()
            .ok_or(DbError::PageFull(page_id))?;

        let mut page = DataPage::new(guard.data_mut());
        let offset = page.record_offset(slot, self.record_size);
        tuple::encode(record, &self.columns, page.data_mut(), offset)?;
        page.set_slot(slot, true);
        let now_full = page.is_full();
        guard.release()?;

        if now_full {
            self.unlink(page_id)?;
            self.push_front(PageList::Full, page_id)?;
            debug!("{}: page {} is now full", self.name, page_id);
        }

        Ok(RecordId::new(page_id, slot as u32))
    }

    /// Returns the records stored in `page_id`, in increasing slot order.
    pub fn get_records_in_data_page(&self, page_id: PageId) -> Result<Vec<Record>> {
        Ok(self
            .get_record_ids_in_data_page(page_id)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    /// Returns the records stored in `page_id` along with their ids.
    pub fn get_record_ids_in_data_page(&self, page_id: PageId) -> Result<Vec<(RecordId, Record)>> {
        let guard = self.buffer_manager.read_page(page_id)?;
        self.check_data_page(page_id, guard.data())?;

        let page = DataPage::new(guard.data());
        let records = page
            .used_slots()
            .map(|slot| {
                let offset = page.record_offset(slot, self.record_size);
                let record = tuple::decode(&self.columns, page.data(), offset)?;
                Ok((RecordId::new(page_id, slot as u32), record))
            })
            .collect::<Result<Vec<_>>>();
        records
    }

    /// Inserts `record` into a page with room, adding a page if needed.
    ///
    /// Fails with `NoSpace` if no page with a free slot exists even after
    /// adding one.
    pub fn insert_record<S: AsRef<str>>(&self, record: &[S]) -> Result<RecordId> {
        if let Some(page_id) = self.get_free_data_page_id()? {
            return self.write_record_to_data_page(record, page_id);
        }

        self.add_data_page()?;
        match self.get_free_data_page_id()? {
            Some(page_id) => self.write_record_to_data_page(record, page_id),
            None => Err(DbError::NoSpace),
        }
    }

    /// Deletes the record at `rid`.
    ///
    /// A page left empty is unlinked and deallocated. A page that was full
    /// moves back to the head of the not-full list.
    pub fn delete_record(&self, rid: RecordId) -> Result<()> {
        let page_id = rid.page_id;
        let slot = rid.slot_idx as usize;

        let mut guard = self.buffer_manager.get_page(page_id)?;
        self.check_data_page(page_id, guard.data())?;

        let view = DataPage::new(guard.data());
        if slot >= view.slot_count() || !view.is_slot_used(slot) {
            return Err(DbError::InvalidSlot(rid));
        }
        let was_full = view.is_full();

        let mut page = DataPage::new(guard.data_mut());
        page.set_slot(slot, false);
        let now_empty = page.is_empty();
        guard.release()?;

        if now_empty {
            self.unlink(page_id)?;
            self.disk_manager.dealloc_page(page_id)?;
            debug!("{}: page {} emptied and deallocated", self.name, page_id);
        } else if was_full {
            self.unlink(page_id)?;
            self.push_front(PageList::NotFull, page_id)?;
            debug!("{}: page {} has room again", self.name, page_id);
        }
        Ok(())
    }

    /// Returns every record of the relation.
    pub fn get_all_records(&self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for page_id in self.get_data_pages()? {
            records.extend(self.get_records_in_data_page(page_id)?);
        }
        Ok(records)
    }

    /// Returns every record of the relation along with its id.
    pub fn get_all_record_ids(&self) -> Result<Vec<(RecordId, Record)>> {
        let mut records = Vec::new();
        for page_id in self.get_data_pages()? {
            records.extend(self.get_record_ids_in_data_page(page_id)?);
        }
        Ok(records)
    }

    /// Returns all data pages: the full list first, then the not-full list.
    pub fn get_data_pages(&self) -> Result<Vec<PageId>> {
        let mut pages = self.list_pages(PageList::Full)?;
        pages.extend(self.list_pages(PageList::NotFull)?);
        Ok(pages)
    }

    /// Deallocates every data page and then the header page.
    pub fn destroy(self) -> Result<()> {
        let pages = self.get_data_pages()?;
        for &page_id in &pages {
            self.disk_manager.dealloc_page(page_id)?;
        }
        self.disk_manager.dealloc_page(self.header_page_id)?;
        debug!(
            "destroyed relation {} ({} data pages)",
            self.name,
            pages.len()
        );
        Ok(())
    }

    fn head(&self, list: PageList) -> Result<Option<PageId>> {
        let guard = self.buffer_manager.read_page(self.header_page_id)?;
        let header = HeaderPage::new(guard.data());
        Ok(match list {
            PageList::Full => header.full_head(),
            PageList::NotFull => header.not_full_head(),
        })
    }

    fn set_head(&self, list: PageList, page_id: Option<PageId>) -> Result<()> {
        let mut guard = self.buffer_manager.get_page(self.header_page_id)?;
        let mut header = HeaderPage::new(guard.data_mut());
        match list {
            PageList::Full => header.set_full_head(page_id),
            PageList::NotFull => header.set_not_full_head(page_id),
        }
        guard.release()
    }

    fn links(&self, page_id: PageId) -> Result<(Option<PageId>, Option<PageId>)> {
        let guard = self.buffer_manager.read_page(page_id)?;
        self.check_data_page(page_id, guard.data())?;
        let page = DataPage::new(guard.data());
        Ok((page.prev(), page.next()))
    }

    fn set_prev(&self, page_id: PageId, prev: Option<PageId>) -> Result<()> {
        let mut guard = self.buffer_manager.get_page(page_id)?;
        DataPage::new(guard.data_mut()).set_prev(prev);
        guard.release()
    }

    fn set_next(&self, page_id: PageId, next: Option<PageId>) -> Result<()> {
        let mut guard = self.buffer_manager.get_page(page_id)?;
        DataPage::new(guard.data_mut()).set_next(next);
        guard.release()
    }

    /// Removes `page_id` from the list holding it. A page without `prev` is
    /// a list head, and the header tells which list that is.
    fn unlink(&self, page_id: PageId) -> Result<()> {
        let (prev, next) = self.links(page_id)?;

        match prev {
            Some(prev) => self.set_next(prev, next)?,
            None => {
                let list = if self.full_head()? == Some(page_id) {
                    PageList::Full
                } else if self.not_full_head()? == Some(page_id) {
                    PageList::NotFull
                } else {
                    return Err(DbError::CorruptPage(
                        page_id,
                        format!("not linked from the header of {}", self.name),
                    ));
                };
                self.set_head(list, next)?;
            }
        }
        if let Some(next) = next {
            self.set_prev(next, prev)?;
        }

        let mut guard = self.buffer_manager.get_page(page_id)?;
        let mut page = DataPage::new(guard.data_mut());
        page.set_prev(None);
        page.set_next(None);
        guard.release()
    }

    /// Links an unlinked `page_id` at the head of `list`.
    fn push_front(&self, list: PageList, page_id: PageId) -> Result<()> {
        let old_head = self.head(list)?;

        let mut guard = self.buffer_manager.get_page(page_id)?;
        let mut page = DataPage::new(guard.data_mut());
        page.set_prev(None);
        page.set_next(old_head);
        guard.release()?;

        if let Some(old_head) = old_head {
            self.set_prev(old_head, Some(page_id))?;
        }
        self.set_head(list, Some(page_id))
    }

    /// Collects the page ids of `list` in link order.
    fn list_pages(&self, list: PageList) -> Result<Vec<PageId>> {
        let mut pages = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.head(list)?;

        while let Some(page_id) = current {
            if !seen.insert(page_id) {
                return Err(DbError::CorruptPage(
                    page_id,
                    format!("cycle in the {:?} list of {}", list, self.name),
                ));
            }
            pages.push(page_id);
            current = self.links(page_id)?.1;
        }
        Ok(pages)
    }

    fn check_data_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        let page = DataPage::new(data);
        if page.slot_count() != self.slots_per_page || !page.fits(self.record_size) {
            return Err(DbError::CorruptPage(
                page_id,
                format!(
                    "{} slots recorded, {} expected for {}",
                    page.slot_count(),
                    self.slots_per_page,
                    self.name
                ),
            ));
        }
        Ok(())
    }
}

/// Computes `(record_size, slots_per_page)` for `columns` on pages of
/// `page_size` bytes.
fn layout(columns: &[ColumnInfo], page_size: usize) -> Result<(usize, usize)> {
    if columns.is_empty() {
        return Err(DbError::Catalog("a relation needs at least one column".into()));
    }
    if let Some(col) = columns.iter().find(|c| !c.column_type().has_valid_width()) {
        return Err(DbError::Catalog(format!(
            "column {} has an out-of-range width: {}",
            col.name(),
            col.column_type()
        )));
    }
    let record_size = tuple::record_size(columns);
    let slots_per_page = DataPage::<&[u8]>::slots_for(page_size, record_size);
    if slots_per_page == 0 {
        return Err(DbError::RelationTooSmall {
            record_size,
            page_size,
        });
    }
    Ok((record_size, slots_per_page))
}
