use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// Byte buffer of one frame.
pub type PageBuf = Box<[u8; PAGE_SIZE]>;

/// FrameHeader is one slot of the buffer pool: the page bytes behind a
/// read/write latch plus the binding and bookkeeping for the page that
/// currently occupies it.
///
/// `page_id`, `pin_count` and `is_dirty` only change under the pool mutex;
/// the latch guards the bytes and is taken by page guards after the pool
/// mutex is released.
pub struct FrameHeader {
    frame_id: FrameId,
    page_id: RwLock<PageId>,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
    data: Arc<RwLock<PageBuf>>,
}

impl FrameHeader {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: RwLock::new(INVALID_PAGE_ID),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: Arc::new(RwLock::new(Box::new([0u8; PAGE_SIZE]))),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        *self.page_id.read()
    }

    pub fn set_page_id(&self, page_id: PageId) {
        *self.page_id.write() = page_id;
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    /// Returns None if the pin count was already 0.
    pub fn unpin(&self) -> Option<u32> {
        loop {
            let current = self.pin_count.load(Ordering::Acquire);
            if current == 0 {
                return None;
            }
            if self
                .pin_count
                .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(current - 1);
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// The latch-protected page bytes.
    pub fn latch(&self) -> &Arc<RwLock<PageBuf>> {
        &self.data
    }

    /// Unbinds the frame. The bytes are left in place until reuse.
    pub fn reset(&self) {
        *self.page_id.write() = INVALID_PAGE_ID;
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
    }
}
