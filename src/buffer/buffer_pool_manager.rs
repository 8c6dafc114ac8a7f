use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::common::{BufferPoolConfig, FrameId, PageId, Result, StrataError};
use crate::storage::disk::DiskSpaceManager;

use super::{
    FrameHeader, ReadPageGuard, ReleaseCallback, Replacer, ReplacerKind, WritePageGuard,
};

/// Page table and free list, guarded together by the pool mutex.
struct PoolState {
    /// Maps every cached page to the frame holding it
    page_table: HashMap<PageId, FrameId>,
    /// Frames not bound to any page
    free_list: VecDeque<FrameId>,
}

/// State shared between the manager and the page guards it hands out.
struct PoolInner {
    frames: Vec<FrameHeader>,
    state: Mutex<PoolState>,
    /// Only touched while `state` is locked
    replacer: Box<dyn Replacer>,
    disk: Arc<DiskSpaceManager>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PoolInner {
    fn frame(&self, frame_id: FrameId) -> &FrameHeader {
        &self.frames[frame_id.as_usize()]
    }

    /// Releases one pin on `page_id`, OR-ing `is_dirty` into the frame.
    /// Returns false if the page is not cached or was not pinned.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };

        let frame = self.frame(frame_id);
        if is_dirty {
            frame.set_dirty(true);
        }
        match frame.unpin() {
            Some(0) => {
                self.replacer.unpin(frame_id);
                true
            }
            Some(_) => true,
            None => {
                warn!(%page_id, "unpin of a page that is not pinned");
                false
            }
        }
    }

    /// Finds a frame for a new binding: the free list first, then a victim
    /// from the replacer. A dirty victim is written back before reuse.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.victim().ok_or(StrataError::BufferPoolFull)?;
        let frame = self.frame(frame_id);
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            // Pin count is zero, so nobody holds the latch.
            let data = frame.latch().read();
            if let Err(e) = self.disk.write_page(old_page_id, &data[..]) {
                drop(data);
                self.replacer.unpin(frame_id);
                return Err(e);
            }
            debug!(page_id = %old_page_id, %frame_id, "wrote back dirty page on eviction");
        } else {
            trace!(page_id = %old_page_id, %frame_id, "evicted clean page");
        }

        state.page_table.remove(&old_page_id);
        frame.reset();
        Ok(frame_id)
    }

    /// Writes `frame` to disk under its read latch. The pool mutex must be
    /// held so the binding cannot change; a frame whose latch is taken by a
    /// writer is skipped rather than waited on.
    fn flush_frame(&self, page_id: PageId, frame: &FrameHeader) -> Result<bool> {
        let Some(data) = frame.latch().try_read() else {
            trace!(%page_id, "page latch held, flush skipped");
            return Ok(false);
        };
        self.disk.write_page(page_id, &data[..])?;
        frame.set_dirty(false);
        Ok(true)
    }

    fn write_back_dirty_frames(&self) -> Result<()> {
        for frame in &self.frames {
            let page_id = frame.page_id();
            if page_id.is_valid() && frame.is_dirty() {
                let data = frame.latch().read();
                self.disk.write_page(page_id, &data[..])?;
                frame.set_dirty(false);
                trace!(%page_id, frame_id = %frame.frame_id(), "wrote back dirty page");
            }
        }
        Ok(())
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        // Runs once the manager and every outstanding guard are gone.
        if let Err(e) = self.write_back_dirty_frames() {
            warn!(error = %e, "failed to write back dirty pages on shutdown");
        }
    }
}

/// BufferPoolManager caches logical pages of the database file in a fixed
/// set of frames.
///
/// Fetching or creating a page pins it and hands back a guard holding the
/// page's read or write latch; dropping the guard releases the latch and
/// unpins the page. A page is only evicted while its pin count is zero.
/// Every bookkeeping operation runs under one pool-wide mutex; page latches
/// are taken after that mutex is released.
pub struct BufferPoolManager {
    pool_size: usize,
    inner: Arc<PoolInner>,
}

impl BufferPoolManager {
    /// Creates a buffer pool with `pool_size` frames over the given space manager.
    pub fn new(pool_size: usize, replacer: ReplacerKind, disk: Arc<DiskSpaceManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(FrameHeader::new(frame_id));
            free_list.push_back(frame_id);
        }

        let inner = Arc::new(PoolInner {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: replacer.build(pool_size),
            disk,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        });

        Self { pool_size, inner }
    }

    pub fn with_config(config: &BufferPoolConfig, disk: Arc<DiskSpaceManager>) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.pool_size, config.replacer, disk))
    }

    /// Allocates a fresh page on disk and installs it pinned, zeroed and
    /// dirty. The returned guard holds the page's write latch.
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let (page_id, frame_id) = {
            let mut state = self.inner.state.lock();
            let frame_id = self.inner.acquire_frame(&mut state)?;

            let page_id = match self.inner.disk.allocate_page() {
                Ok(page_id) => page_id,
                Err(e) => {
                    state.free_list.push_back(frame_id);
                    return Err(e);
                }
            };

            let frame = self.inner.frame(frame_id);
            frame.latch().write().fill(0);
            frame.set_page_id(page_id);
            frame.set_dirty(true);
            frame.pin();
            self.inner.replacer.pin(frame_id);
            state.page_table.insert(page_id, frame_id);

            (page_id, frame_id)
        };

        trace!(%page_id, %frame_id, "created page");
        Ok(WritePageGuard::new(
            page_id,
            self.inner.frame(frame_id),
            self.release_callback(),
        ))
    }

    /// Fetches a page for read access.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.pin_page(page_id)?;
        Ok(ReadPageGuard::new(
            page_id,
            self.inner.frame(frame_id),
            self.release_callback(),
        ))
    }

    /// Fetches a page for write access.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.pin_page(page_id)?;
        Ok(WritePageGuard::new(
            page_id,
            self.inner.frame(frame_id),
            self.release_callback(),
        ))
    }

    fn release_callback(&self) -> ReleaseCallback {
        let inner = Arc::clone(&self.inner);
        Box::new(move |page_id, is_dirty| {
            inner.unpin_page(page_id, is_dirty);
        })
    }

    /// Pins `page_id` in a frame, reading it from disk on a miss.
    fn pin_page(&self, page_id: PageId) -> Result<FrameId> {
        if !page_id.is_valid() {
            return Err(StrataError::InvalidPageId(page_id));
        }

        let mut state = self.inner.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.inner.frame(frame_id).pin();
            self.inner.replacer.pin(frame_id);
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(frame_id);
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        if self.inner.disk.is_page_free(page_id)? {
            return Err(StrataError::PageNotAllocated(page_id));
        }

        let frame_id = self.inner.acquire_frame(&mut state)?;
        let frame = self.inner.frame(frame_id);
        {
            let mut data = frame.latch().write();
            if let Err(e) = self.inner.disk.read_page(page_id, &mut data[..]) {
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        }

        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();
        self.inner.replacer.pin(frame_id);
        state.page_table.insert(page_id, frame_id);

        trace!(%page_id, %frame_id, "read page into pool");
        Ok(frame_id)
    }

    /// Writes a cached page to disk and clears its dirty flag.
    ///
    /// Returns false if the page is not cached, or if a write guard on it is
    /// outstanding; such a page stays dirty and is written back on eviction.
    /// Flushing does not count as a use for replacement.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(StrataError::InvalidPageId(page_id));
        }

        let state = self.inner.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };
        self.inner.flush_frame(page_id, self.inner.frame(frame_id))
    }

    /// Flushes every dirty cached page whose latch is free. Returns the
    /// number of pages written.
    pub fn flush_all_pages(&self) -> Result<usize> {
        let state = self.inner.state.lock();
        let mut flushed = 0;
        for (&page_id, &frame_id) in &state.page_table {
            let frame = self.inner.frame(frame_id);
            if frame.is_dirty() && self.inner.flush_frame(page_id, frame)? {
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    /// Drops a page from the pool and frees it on disk.
    ///
    /// Returns false if the page is not allocated. Deleting a page that is
    /// still pinned is an invariant violation.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(StrataError::InvalidPageId(page_id));
        }

        let mut state = self.inner.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = self.inner.frame(frame_id);
            if frame.pin_count() > 0 {
                return Err(StrataError::PageStillPinned(page_id));
            }

            state.page_table.remove(&page_id);
            self.inner.replacer.pin(frame_id);
            frame.reset();
            state.free_list.push_back(frame_id);
        } else if self.inner.disk.is_page_free(page_id)? {
            return Ok(false);
        }

        self.inner.disk.deallocate_page(page_id)?;
        debug!(%page_id, "deleted page");
        Ok(true)
    }

    /// Allocates a page on disk without bringing it into the pool.
    pub fn allocate_page(&self) -> Result<PageId> {
        self.inner.disk.allocate_page()
    }

    /// Frees a page on disk, dropping it from the pool first if cached.
    /// Freeing a page that is already free is an invariant violation.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        if self.delete_page(page_id)? {
            Ok(())
        } else {
            Err(StrataError::PageAlreadyFree(page_id))
        }
    }

    pub fn is_page_free(&self, page_id: PageId) -> Result<bool> {
        self.inner.disk.is_page_free(page_id)
    }

    /// Returns true when no frame is pinned.
    pub fn check_all_unpinned(&self) -> bool {
        let _state = self.inner.state.lock();
        let mut all_unpinned = true;
        for frame in &self.inner.frames {
            if frame.pin_count() > 0 {
                warn!(
                    page_id = %frame.page_id(),
                    pin_count = frame.pin_count(),
                    "page still pinned"
                );
                all_unpinned = false;
            }
        }
        all_unpinned
    }

    /// Fraction of fetches served from the pool since the last reset.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        if hits + misses == 0 {
            return 0.0;
        }
        hits as f64 / (hits + misses) as f64
    }

    /// Returns the number of fetches served from the pool.
    pub fn hits(&self) -> u64 {
        self.inner.hits.load(Ordering::Relaxed)
    }

    /// Returns the number of fetches that had to read from disk.
    pub fn misses(&self) -> u64 {
        self.inner.misses.load(Ordering::Relaxed)
    }

    /// Zeroes the hit and miss counters.
    pub fn reset_counters(&self) {
        self.inner.hits.store(0, Ordering::Relaxed);
        self.inner.misses.store(0, Ordering::Relaxed);
    }

    /// Returns the pin count for a cached page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.inner.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.inner.frame(frame_id).pin_count())
    }

    /// Returns whether a cached page is dirty.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let state = self.inner.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.inner.frame(frame_id).is_dirty())
    }

    /// Snapshot of the page table.
    pub fn cached_pages(&self) -> Vec<(PageId, FrameId)> {
        let state = self.inner.state.lock();
        state
            .page_table
            .iter()
            .map(|(&page_id, &frame_id)| (page_id, frame_id))
            .collect()
    }

    /// Returns the number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of frames not bound to any page.
    pub fn free_frame_count(&self) -> usize {
        self.inner.state.lock().free_list.len()
    }

    /// Returns the number of bound frames the replacer may evict.
    pub fn evictable_frame_count(&self) -> usize {
        let _state = self.inner.state.lock();
        self.inner.replacer.size()
    }

    /// Returns the disk space manager backing the pool.
    pub fn disk(&self) -> &Arc<DiskSpaceManager> {
        &self.inner.disk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dsm = Arc::new(DiskSpaceManager::new(temp_file.path()).unwrap());
        let bpm = BufferPoolManager::new(pool_size, ReplacerKind::Lru, dsm);
        (bpm, temp_file)
    }

    #[test]
    fn test_buffer_pool_manager_new() {
        let (bpm, _temp) = create_bpm(10);
        assert_eq!(bpm.pool_size(), 10);
        assert_eq!(bpm.free_frame_count(), 10);
        assert!(bpm.check_all_unpinned());
    }

    #[test]
    fn test_new_page_is_pinned_and_dirty() {
        let (bpm, _temp) = create_bpm(10);

        let guard = bpm.new_page().unwrap();
        let page_id = guard.page_id();
        assert_eq!(page_id, PageId::new(0));
        assert_eq!(bpm.pin_count(page_id), Some(1));
        assert_eq!(bpm.is_dirty(page_id), Some(true));
        assert!(guard.data().iter().all(|&b| b == 0));
        assert_eq!(bpm.free_frame_count(), 9);

        drop(guard);
        assert_eq!(bpm.pin_count(page_id), Some(0));
        assert_eq!(bpm.evictable_frame_count(), 1);
    }

    #[test]
    fn test_read_write_through_guards() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[0] = 42;
            guard.data_mut()[100] = 255;
            guard.page_id()
        };

        let guard = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(guard.data()[0], 42);
        assert_eq!(guard.data()[100], 255);
    }

    #[test]
    fn test_flush_clears_dirty() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = bpm.new_page().unwrap().page_id();
        assert!(bpm.flush_page(page_id).unwrap());
        assert_eq!(bpm.is_dirty(page_id), Some(false));
        assert_eq!(bpm.pin_count(page_id), Some(0));

        assert!(!bpm.flush_page(PageId::new(77)).unwrap());
    }

    #[test]
    fn test_unpin_ors_dirty_flag() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = {
            let mut guard = bpm.new_page().unwrap();
            guard.data_mut()[0] = 1;
            guard.page_id()
        };
        bpm.flush_page(page_id).unwrap();

        let mut writer = bpm.fetch_page_write(page_id).unwrap();
        writer.mark_dirty();
        drop(writer);
        // A later clean release does not clear the flag.
        drop(bpm.fetch_page_read(page_id).unwrap());
        assert_eq!(bpm.is_dirty(page_id), Some(true));
    }

    #[test]
    fn test_flush_skips_page_under_write_guard() {
        let (bpm, _temp) = create_bpm(10);

        let other = bpm.new_page().unwrap().page_id();
        let mut guard = bpm.new_page().unwrap();
        guard.data_mut()[0] = 1;
        let held = guard.page_id();

        assert!(!bpm.flush_page(held).unwrap());
        assert_eq!(bpm.flush_all_pages().unwrap(), 1);
        assert_eq!(bpm.is_dirty(other), Some(false));
        assert_eq!(bpm.is_dirty(held), Some(true));

        drop(guard);
        assert!(bpm.flush_page(held).unwrap());
        assert_eq!(bpm.is_dirty(held), Some(false));
    }

    #[test]
    fn test_flush_page_with_reader_outstanding() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = bpm.new_page().unwrap().page_id();
        let _reader = bpm.fetch_page_read(page_id).unwrap();
        assert!(bpm.flush_page(page_id).unwrap());
        assert_eq!(bpm.pin_count(page_id), Some(1));
    }

    #[test]
    fn test_flush_keeps_eviction_order() {
        let (bpm, _temp) = create_bpm(2);

        let first = bpm.new_page().unwrap().page_id();
        let second = bpm.new_page().unwrap().page_id();
        assert!(bpm.flush_page(first).unwrap());
        assert_eq!(bpm.evictable_frame_count(), 2);

        // `first` is still the least recently unpinned frame.
        let third = bpm.new_page().unwrap().page_id();
        assert_eq!(bpm.pin_count(first), None);
        assert_eq!(bpm.pin_count(second), Some(0));
        assert_eq!(bpm.pin_count(third), Some(0));
    }

    #[test]
    fn test_fetch_unallocated_page_fails() {
        let (bpm, _temp) = create_bpm(4);
        assert!(matches!(
            bpm.fetch_page_read(PageId::new(3)),
            Err(StrataError::PageNotAllocated(_))
        ));
        assert!(matches!(
            bpm.fetch_page_read(crate::common::INVALID_PAGE_ID),
            Err(StrataError::InvalidPageId(_))
        ));
    }

    #[test]
    fn test_delete_page() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = bpm.new_page().unwrap().page_id();

        {
            let _guard = bpm.fetch_page_read(page_id).unwrap();
            let err = bpm.delete_page(page_id).unwrap_err();
            assert!(matches!(err, StrataError::PageStillPinned(_)));
            assert!(err.is_invariant_violation());
        }

        assert!(bpm.delete_page(page_id).unwrap());
        assert_eq!(bpm.pin_count(page_id), None);
        assert!(bpm.is_page_free(page_id).unwrap());
        assert_eq!(bpm.free_frame_count(), 10);

        assert!(!bpm.delete_page(page_id).unwrap());
        assert!(matches!(
            bpm.deallocate_page(page_id),
            Err(StrataError::PageAlreadyFree(_))
        ));
    }

    #[test]
    fn test_buffer_pool_full() {
        let (bpm, _temp) = create_bpm(2);

        let _guard1 = bpm.new_page().unwrap();
        let _guard2 = bpm.new_page().unwrap();

        assert!(matches!(bpm.new_page(), Err(StrataError::BufferPoolFull)));
        // The failed request must not have consumed a disk page.
        assert_eq!(bpm.disk().num_allocated_pages(), 2);
    }
}
