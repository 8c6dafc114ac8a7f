use std::ops::{Deref, DerefMut};

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::RawRwLock;

use crate::common::PageId;

use super::{FrameHeader, PageBuf};

/// Callback type for releasing a page guard: unpins `page_id`, OR-ing in
/// the dirty flag.
pub(crate) type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// Base page guard that manages the common functionality
struct PageGuardBase {
    page_id: PageId,
    release_callback: Option<ReleaseCallback>,
    is_dirty: bool,
}

impl PageGuardBase {
    fn new(page_id: PageId, release_callback: ReleaseCallback) -> Self {
        Self {
            page_id,
            release_callback: Some(release_callback),
            is_dirty: false,
        }
    }

    fn release(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback(self.page_id, self.is_dirty);
        }
    }
}

/// A pinned page held under its read latch.
/// Dropping the guard releases the latch and then unpins the page.
pub struct ReadPageGuard {
    base: PageGuardBase,
    data_guard: Option<ArcRwLockReadGuard<RawRwLock, PageBuf>>,
}

impl ReadPageGuard {
    /// Takes the frame's read latch. The frame must already be pinned.
    pub(crate) fn new(
        page_id: PageId,
        frame: &FrameHeader,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self {
            base: PageGuardBase::new(page_id, release_callback),
            data_guard: Some(frame.latch().read_arc()),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    pub fn data(&self) -> &[u8] {
        match &self.data_guard {
            Some(guard) => &guard[..],
            None => &[],
        }
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.data_guard.take();
        self.base.release();
    }
}

/// A pinned page held under its write latch.
/// Any mutable access marks the page dirty; dropping the guard releases
/// the latch and then unpins the page.
pub struct WritePageGuard {
    base: PageGuardBase,
    data_guard: Option<ArcRwLockWriteGuard<RawRwLock, PageBuf>>,
}

impl WritePageGuard {
    /// Takes the frame's write latch. The frame must already be pinned.
    pub(crate) fn new(
        page_id: PageId,
        frame: &FrameHeader,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self {
            base: PageGuardBase::new(page_id, release_callback),
            data_guard: Some(frame.latch().write_arc()),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    pub fn data(&self) -> &[u8] {
        match &self.data_guard {
            Some(guard) => &guard[..],
            None => &[],
        }
    }

    /// Returns a mutable reference to the page data and marks it dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.base.is_dirty = true;
        match &mut self.data_guard {
            Some(guard) => &mut guard[..],
            None => &mut [],
        }
    }

    pub fn mark_dirty(&mut self) {
        self.base.is_dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.base.is_dirty
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.data_guard.take();
        self.base.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FrameId;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_read_page_guard() {
        let frame = FrameHeader::new(FrameId::new(0));
        frame.set_page_id(PageId::new(1));

        frame.latch().write()[0] = 42;

        let released = Arc::new(AtomicBool::new(false));
        let released_clone = released.clone();

        let guard = ReadPageGuard::new(
            PageId::new(1),
            &frame,
            Box::new(move |_, _| {
                released_clone.store(true, Ordering::SeqCst);
            }),
        );

        assert_eq!(guard.page_id(), PageId::new(1));
        assert_eq!(guard.data()[0], 42);
        assert!(frame.latch().try_write().is_none());
        assert!(!released.load(Ordering::SeqCst));

        drop(guard);
        assert!(released.load(Ordering::SeqCst));
        assert!(frame.latch().try_write().is_some());
    }

    #[test]
    fn test_write_page_guard() {
        let frame = FrameHeader::new(FrameId::new(0));
        frame.set_page_id(PageId::new(1));

        let dirty = Arc::new(AtomicBool::new(false));
        let dirty_clone = dirty.clone();

        let mut guard = WritePageGuard::new(
            PageId::new(1),
            &frame,
            Box::new(move |_, is_dirty| {
                dirty_clone.store(is_dirty, Ordering::SeqCst);
            }),
        );

        assert!(!guard.is_dirty());
        guard.data_mut()[0] = 42;
        assert!(guard.is_dirty());
        drop(guard);

        assert!(dirty.load(Ordering::SeqCst));
        assert_eq!(frame.latch().read()[0], 42);
    }

    #[test]
    fn test_read_only_write_guard_stays_clean() {
        let frame = FrameHeader::new(FrameId::new(0));
        let dirty = Arc::new(AtomicBool::new(true));
        let dirty_clone = dirty.clone();

        let guard = WritePageGuard::new(
            PageId::new(1),
            &frame,
            Box::new(move |_, is_dirty| {
                dirty_clone.store(is_dirty, Ordering::SeqCst);
            }),
        );
        assert_eq!(guard.data()[0], 0);
        drop(guard);

        assert!(!dirty.load(Ordering::SeqCst));
    }
}
