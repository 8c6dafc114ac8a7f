use std::fmt;

/// Logical page identifier handed out by the disk space manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        *self != INVALID_PAGE_ID
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageId({})", self.0)
    }
}

/// Frame identifier type - identifies a buffer frame in the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

impl FrameId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({})", self.0)
    }
}

/// Slot number of a row inside a heap page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u16);

impl SlotId {
    pub fn new(id: u16) -> Self {
        Self(id)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

/// Row identifier stored in B+ tree leaves: the heap page plus the slot
/// within it. Serialized as 4 + 2 little-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RowId {
    pub const ENCODED_SIZE: usize = 6;

    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }

    pub fn encode_into(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.page_id.as_u32().to_le_bytes());
        out[4..6].copy_from_slice(&self.slot_id.as_u16().to_le_bytes());
    }

    pub fn decode(bytes: &[u8]) -> Self {
        let page = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let slot = u16::from_le_bytes([bytes[4], bytes[5]]);
        Self::new(PageId::new(page), SlotId::new(slot))
    }
}

/// Sentinel for "no page". Stored on disk as `u32::MAX`.
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_id_encoding() {
        let rid = RowId::new(PageId::new(0xDEAD_BEEF), SlotId::new(513));
        let mut buf = [0u8; RowId::ENCODED_SIZE];
        rid.encode_into(&mut buf);
        assert_eq!(&buf[0..4], &0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(RowId::decode(&buf), rid);
    }

    #[test]
    fn test_invalid_page_id() {
        assert!(!INVALID_PAGE_ID.is_valid());
        assert!(PageId::new(0).is_valid());
    }
}
