use crate::common::{PageId, PAGE_SIZE};

const COUNT_OFFSET: usize = 0;
const ENTRIES_OFFSET: usize = 4;
const ENTRY_SIZE: usize = 8;

/// Maximum number of indexes one roots page can record.
pub const MAX_INDEX_ROOTS: usize = (PAGE_SIZE - ENTRIES_OFFSET) / ENTRY_SIZE;

/// View over the index roots page: a count followed by
/// `(index_id, root_page_id)` pairs. A zeroed page is an empty registry.
pub struct IndexRootsPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> IndexRootsPage<B> {
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

    pub fn count(&self) -> usize {
        (self.read_u32(COUNT_OFFSET) as usize).min(MAX_INDEX_ROOTS)
    }

    fn index_id_at(&self, slot: usize) -> u32 {
        self.read_u32(ENTRIES_OFFSET + slot * ENTRY_SIZE)
    }

    fn root_at(&self, slot: usize) -> PageId {
        PageId::new(self.read_u32(ENTRIES_OFFSET + slot * ENTRY_SIZE + 4))
    }

    fn find(&self, index_id: u32) -> Option<usize> {
        (0..self.count()).find(|&slot| self.index_id_at(slot) == index_id)
    }

    pub fn get_root(&self, index_id: u32) -> Option<PageId> {
        self.find(index_id).map(|slot| self.root_at(slot))
    }

    pub fn entries(&self) -> Vec<(u32, PageId)> {
        (0..self.count())
            .map(|slot| (self.index_id_at(slot), self.root_at(slot)))
            .collect()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> IndexRootsPage<B> {
    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data.as_mut()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn write_entry(&mut self, slot: usize, index_id: u32, root: PageId) {
        let offset = ENTRIES_OFFSET + slot * ENTRY_SIZE;
        self.write_u32(offset, index_id);
        self.write_u32(offset + 4, root.as_u32());
    }

    /// Inserts or updates the root of `index_id`. Returns false when the
    /// page has no room for a new entry.
    pub fn set_root(&mut self, index_id: u32, root: PageId) -> bool {
        if let Some(slot) = self.find(index_id) {
            self.write_entry(slot, index_id, root);
            return true;
        }

        let count = self.count();
        if count >= MAX_INDEX_ROOTS {
            return false;
        }
        self.write_entry(count, index_id, root);
        self.write_u32(COUNT_OFFSET, (count + 1) as u32);
        true
    }

    /// Removes the entry for `index_id`, moving the last entry into its slot.
    pub fn remove(&mut self, index_id: u32) -> bool {
        let Some(slot) = self.find(index_id) else {
            return false;
        };

        let last = self.count() - 1;
        if slot != last {
            let (id, root) = (self.index_id_at(last), self.root_at(last));
            self.write_entry(slot, id, root);
        }
        self.write_u32(COUNT_OFFSET, last as u32);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_page_is_empty() {
        let buf = vec![0u8; PAGE_SIZE];
        let roots = IndexRootsPage::new(&buf[..]);
        assert_eq!(roots.count(), 0);
        assert_eq!(roots.get_root(1), None);
    }

    #[test]
    fn test_set_update_remove() {
        let mut buf = vec![0u8; PAGE_SIZE];
        let mut roots = IndexRootsPage::new(&mut buf[..]);

        assert!(roots.set_root(7, PageId::new(100)));
        assert!(roots.set_root(8, PageId::new(200)));
        assert!(roots.set_root(7, PageId::new(101)));
        assert_eq!(roots.count(), 2);
        assert_eq!(roots.get_root(7), Some(PageId::new(101)));

        assert!(roots.remove(7));
        assert!(!roots.remove(7));
        assert_eq!(roots.entries(), vec![(8, PageId::new(200))]);
    }

    #[test]
    fn test_full_page() {
        let mut buf = vec![0u8; PAGE_SIZE];
        let mut roots = IndexRootsPage::new(&mut buf[..]);
        for id in 0..MAX_INDEX_ROOTS as u32 {
            assert!(roots.set_root(id, PageId::new(id)));
        }
        assert!(!roots.set_root(u32::MAX, PageId::new(0)));
        assert!(roots.set_root(3, PageId::new(33)));
    }
}
