use crate::common::{PageId, PAGE_ID_SIZE};

/// Header page layout (one per relation):
///
/// | Field          | Offset | Size |
/// |----------------|--------|------|
/// | full_head      | 0      | 8    |
/// | not_full_head  | 8      | 8    |
///
/// The rest of the page is unused. A pointer is `(file_idx, page_idx)`,
/// with `(-1, -1)` for an empty list.
const FULL_HEAD_OFFSET: usize = 0;
const NOT_FULL_HEAD_OFFSET: usize = FULL_HEAD_OFFSET + PAGE_ID_SIZE;

/// Bytes of the header page that carry list heads.
pub const HEADER_PAGE_SIZE: usize = NOT_FULL_HEAD_OFFSET + PAGE_ID_SIZE;

/// View over the bytes of a relation's header page.
pub struct HeaderPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> HeaderPage<B> {
    /// Creates a view over the given page bytes.
    pub fn new(data: B) -> Self {
        assert!(data.as_ref().len() >= HEADER_PAGE_SIZE);
        Self { data }
    }

    /// Returns the first page of the full list.
    pub fn full_head(&self) -> Option<PageId> {
        PageId::read_from(&self.data.as_ref()[FULL_HEAD_OFFSET..])
    }

    /// Returns the first page of the not-full list.
    pub fn not_full_head(&self) -> Option<PageId> {
        PageId::read_from(&self.data.as_ref()[NOT_FULL_HEAD_OFFSET..])
    }

    /// True while the header still holds the zero bytes of a freshly
    /// extended file, i.e. it was never initialized.
    pub fn is_uninitialized(&self) -> bool {
        self.data.as_ref()[..HEADER_PAGE_SIZE].iter().all(|&b| b == 0)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HeaderPage<B> {
    /// Resets both lists to empty.
    pub fn init(&mut self) {
        self.data.as_mut().fill(0);
        self.set_full_head(None);
        self.set_not_full_head(None);
    }

    pub fn set_full_head(&mut self, page_id: Option<PageId>) {
        PageId::write_to(page_id, &mut self.data.as_mut()[FULL_HEAD_OFFSET..]);
    }

    pub fn set_not_full_head(&mut self, page_id: Option<PageId>) {
        PageId::write_to(page_id, &mut self.data.as_mut()[NOT_FULL_HEAD_OFFSET..]);
    }
}
