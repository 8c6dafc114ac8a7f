use crate::common::{BITMAP_CAPACITY, MAX_EXTENTS, META_HEADER_SIZE, PAGE_SIZE};

const MAGIC_NUMBER: u32 = 0x5354_5241; // "STRA"
const VERSION: u32 = 1;

const MAGIC_OFFSET: usize = 0;
const VERSION_OFFSET: usize = 4;
const ALLOCATED_PAGES_OFFSET: usize = 8;
const NUM_EXTENTS_OFFSET: usize = 12;
const NEXT_FREE_EXTENT_OFFSET: usize = 16;
const EXTENT_USED_OFFSET: usize = META_HEADER_SIZE;

/// View over physical page 0: allocated-page total, extent count, a hint
/// for the first extent that is not full, and the used-page count of every
/// extent.
pub struct FileMetaPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> FileMetaPage<B> {
    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self { data }
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let bytes = self.data.as_ref();
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    /// A zeroed page is a fresh file; anything else must carry our magic.
    pub fn is_blank(&self) -> bool {
        self.data.as_ref().iter().all(|&b| b == 0)
    }

    pub fn is_valid(&self) -> bool {
        self.read_u32(MAGIC_OFFSET) == MAGIC_NUMBER
            && self.read_u32(VERSION_OFFSET) == VERSION
            && self.num_extents() <= MAX_EXTENTS
    }

    pub fn num_allocated_pages(&self) -> u32 {
        self.read_u32(ALLOCATED_PAGES_OFFSET)
    }

    pub fn num_extents(&self) -> u32 {
        self.read_u32(NUM_EXTENTS_OFFSET)
    }

    pub fn next_free_extent(&self) -> u32 {
        self.read_u32(NEXT_FREE_EXTENT_OFFSET)
    }

    pub fn extent_used_pages(&self, extent_id: u32) -> u32 {
        debug_assert!(extent_id < MAX_EXTENTS);
        self.read_u32(EXTENT_USED_OFFSET + extent_id as usize * 4)
    }

    pub fn is_extent_full(&self, extent_id: u32) -> bool {
        self.extent_used_pages(extent_id) >= BITMAP_CAPACITY
    }

    /// First extent at or after `from` that still has a free slot.
    pub fn find_not_full_extent(&self, from: u32) -> Option<u32> {
        (from..self.num_extents()).find(|&e| !self.is_extent_full(e))
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> FileMetaPage<B> {
    pub fn init(&mut self) {
        self.data.as_mut().fill(0);
        self.write_u32(MAGIC_OFFSET, MAGIC_NUMBER);
        self.write_u32(VERSION_OFFSET, VERSION);
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data.as_mut()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn set_num_allocated_pages(&mut self, count: u32) {
        self.write_u32(ALLOCATED_PAGES_OFFSET, count);
    }

    pub fn set_num_extents(&mut self, count: u32) {
        self.write_u32(NUM_EXTENTS_OFFSET, count);
    }

    pub fn set_next_free_extent(&mut self, extent_id: u32) {
        self.write_u32(NEXT_FREE_EXTENT_OFFSET, extent_id);
    }

    pub fn set_extent_used_pages(&mut self, extent_id: u32, count: u32) {
        self.write_u32(EXTENT_USED_OFFSET + extent_id as usize * 4, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_page_init_and_counters() {
        let mut data = [0u8; PAGE_SIZE];
        let mut meta = FileMetaPage::new(&mut data[..]);
        assert!(meta.is_blank());

        meta.init();
        assert!(meta.is_valid());
        assert_eq!(meta.num_extents(), 0);

        meta.set_num_extents(2);
        meta.set_extent_used_pages(0, BITMAP_CAPACITY);
        meta.set_extent_used_pages(1, 5);
        meta.set_num_allocated_pages(BITMAP_CAPACITY + 5);

        assert!(meta.is_extent_full(0));
        assert_eq!(meta.find_not_full_extent(0), Some(1));
        assert_eq!(meta.find_not_full_extent(2), None);

        let view = FileMetaPage::new(&data[..]);
        assert_eq!(view.num_allocated_pages(), BITMAP_CAPACITY + 5);
    }

    #[test]
    fn test_meta_page_rejects_garbage() {
        let data = [0xABu8; PAGE_SIZE];
        let meta = FileMetaPage::new(&data[..]);
        assert!(!meta.is_blank());
        assert!(!meta.is_valid());
    }
}
