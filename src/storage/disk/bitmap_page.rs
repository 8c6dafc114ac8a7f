use crate::common::{BITMAP_CAPACITY, BITMAP_HEADER_SIZE, PAGE_SIZE};

const ALLOCATED_OFFSET: usize = 0;
const NEXT_FREE_OFFSET: usize = 4;

/// View over an extent's bitmap page. Bit `i` is set when data page `i` of
/// the extent is allocated. `next_free` always holds the lowest free offset
/// (or `BITMAP_CAPACITY` when the extent is full), so allocation hands out
/// the lowest free slot first.
pub struct BitmapPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> BitmapPage<B> {
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

    pub fn allocated_count(&self) -> u32 {
        self.read_u32(ALLOCATED_OFFSET)
    }

    pub fn next_free(&self) -> u32 {
        self.read_u32(NEXT_FREE_OFFSET)
    }

    pub fn is_full(&self) -> bool {
        self.allocated_count() >= BITMAP_CAPACITY
    }

    pub fn is_page_free(&self, offset: u32) -> bool {
        if offset >= BITMAP_CAPACITY {
            return false;
        }
        let byte = self.data.as_ref()[BITMAP_HEADER_SIZE + (offset / 8) as usize];
        byte & (1 << (offset % 8)) == 0
    }

    /// Scans for the first free offset at or after `from`.
    fn scan_free_from(&self, from: u32) -> u32 {
        let bits = &self.data.as_ref()[BITMAP_HEADER_SIZE..];
        let mut offset = from;
        while offset < BITMAP_CAPACITY {
            let byte = bits[(offset / 8) as usize];
            if byte == 0xFF && offset % 8 == 0 {
                offset += 8;
                continue;
            }
            if byte & (1 << (offset % 8)) == 0 {
                return offset;
            }
            offset += 1;
        }
        BITMAP_CAPACITY
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BitmapPage<B> {
    pub fn init(&mut self) {
        self.data.as_mut().fill(0);
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data.as_mut()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn set_bit(&mut self, offset: u32, used: bool) {
        let byte = &mut self.data.as_mut()[BITMAP_HEADER_SIZE + (offset / 8) as usize];
        if used {
            *byte |= 1 << (offset % 8);
        } else {
            *byte &= !(1 << (offset % 8));
        }
    }

    /// Marks the lowest free slot as used and returns its offset.
    pub fn allocate_page(&mut self) -> Option<u32> {
        if self.is_full() {
            return None;
        }

        let offset = self.scan_free_from(self.next_free());
        if offset >= BITMAP_CAPACITY {
            return None;
        }

        self.set_bit(offset, true);
        let allocated = self.allocated_count() + 1;
        self.write_u32(ALLOCATED_OFFSET, allocated);
        let next = self.scan_free_from(offset + 1);
        self.write_u32(NEXT_FREE_OFFSET, next);
        Some(offset)
    }

    /// Clears the slot at `offset`. Returns false if it was already free.
    pub fn deallocate_page(&mut self, offset: u32) -> bool {
        if offset >= BITMAP_CAPACITY || self.is_page_free(offset) {
            return false;
        }

        self.set_bit(offset, false);
        let allocated = self.allocated_count() - 1;
        self.write_u32(ALLOCATED_OFFSET, allocated);
        if offset < self.next_free() {
            self.write_u32(NEXT_FREE_OFFSET, offset);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_allocates_in_order() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bitmap = BitmapPage::new(&mut data[..]);
        bitmap.init();

        for expected in 0..20 {
            assert_eq!(bitmap.allocate_page(), Some(expected));
        }
        assert_eq!(bitmap.allocated_count(), 20);
        assert_eq!(bitmap.next_free(), 20);
        assert!(!bitmap.is_page_free(7));
        assert!(bitmap.is_page_free(20));
    }

    #[test]
    fn test_bitmap_reuses_lowest_freed_slot() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bitmap = BitmapPage::new(&mut data[..]);
        bitmap.init();

        for _ in 0..10 {
            bitmap.allocate_page();
        }
        assert!(bitmap.deallocate_page(6));
        assert!(bitmap.deallocate_page(2));
        assert!(!bitmap.deallocate_page(2));

        assert_eq!(bitmap.allocate_page(), Some(2));
        assert_eq!(bitmap.allocate_page(), Some(6));
        assert_eq!(bitmap.allocate_page(), Some(10));
    }

    #[test]
    fn test_bitmap_fills_up() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bitmap = BitmapPage::new(&mut data[..]);
        bitmap.init();

        for _ in 0..BITMAP_CAPACITY {
            assert!(bitmap.allocate_page().is_some());
        }
        assert!(bitmap.is_full());
        assert_eq!(bitmap.allocate_page(), None);
        assert_eq!(bitmap.next_free(), BITMAP_CAPACITY);

        assert!(bitmap.deallocate_page(BITMAP_CAPACITY - 1));
        assert_eq!(bitmap.allocate_page(), Some(BITMAP_CAPACITY - 1));
    }
}
