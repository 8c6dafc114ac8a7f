use std::collections::{HashMap, VecDeque};
use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::buffer::{LruReplacer, Replacer};
use crate::common::{
    DiskConfig, FrameId, PageId, Result, StrataError, BITMAP_CAPACITY, MAX_EXTENTS,
    MAX_LOGICAL_PAGES, PAGE_SIZE,
};

use super::{BitmapPage, DiskManager, FileMetaPage};

/// Physical page holding the file meta page.
const META_PHYSICAL_PAGE: u32 = 0;

/// Physical page of the bitmap that governs `extent_id`. Each extent is one
/// bitmap page followed by `BITMAP_CAPACITY` data pages.
fn bitmap_physical_page(extent_id: u32) -> u32 {
    1 + extent_id * (BITMAP_CAPACITY + 1)
}

/// Physical page backing a logical page id. Callers range-check the id.
pub(crate) fn physical_page_of(page_id: PageId) -> u32 {
    let extent_id = page_id.as_u32() / BITMAP_CAPACITY;
    let offset = page_id.as_u32() % BITMAP_CAPACITY;
    bitmap_physical_page(extent_id) + 1 + offset
}

fn split_page_id(page_id: PageId) -> (u32, u32) {
    (
        page_id.as_u32() / BITMAP_CAPACITY,
        page_id.as_u32() % BITMAP_CAPACITY,
    )
}

struct BitmapFrame {
    extent_id: Option<u32>,
    is_dirty: bool,
    data: Box<[u8; PAGE_SIZE]>,
}

/// Small private cache of extent bitmap pages, keyed by extent id and
/// recycled through its own LRU replacer.
struct BitmapCache {
    frames: Vec<BitmapFrame>,
    table: HashMap<u32, FrameId>,
    free_list: VecDeque<FrameId>,
    replacer: LruReplacer,
}

impl BitmapCache {
    fn new(num_frames: usize) -> Self {
        let mut frames = Vec::with_capacity(num_frames);
        let mut free_list = VecDeque::with_capacity(num_frames);
        for i in 0..num_frames {
            frames.push(BitmapFrame {
                extent_id: None,
                is_dirty: false,
                data: Box::new([0u8; PAGE_SIZE]),
            });
            free_list.push_back(FrameId::new(i as u32));
        }

        Self {
            frames,
            table: HashMap::new(),
            free_list,
            replacer: LruReplacer::new(num_frames),
        }
    }

    /// Moves a frame to the most-recently-used end of the replacer.
    fn touch(&self, frame_id: FrameId) {
        self.replacer.pin(frame_id);
        self.replacer.unpin(frame_id);
    }

    /// Finds a reusable frame, writing back a dirty bitmap it evicts.
    fn take_frame(&mut self, disk: &DiskManager) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.pop_front() {
            return Ok(frame_id);
        }

        // Every frame is evictable between calls, so a victim always exists.
        let frame_id = self.replacer.victim().ok_or(StrataError::BufferPoolFull)?;
        let frame = &mut self.frames[frame_id.as_usize()];
        if let Some(old_extent) = frame.extent_id.take() {
            if frame.is_dirty {
                disk.write_page(bitmap_physical_page(old_extent), &frame.data[..])?;
                frame.is_dirty = false;
            }
            self.table.remove(&old_extent);
            trace!(extent_id = old_extent, "evicted bitmap page");
        }
        Ok(frame_id)
    }

    /// Returns the frame holding `extent_id`'s bitmap, loading it if needed.
    fn load(&mut self, disk: &DiskManager, extent_id: u32) -> Result<FrameId> {
        if let Some(&frame_id) = self.table.get(&extent_id) {
            self.touch(frame_id);
            return Ok(frame_id);
        }

        let frame_id = self.take_frame(disk)?;
        let frame = &mut self.frames[frame_id.as_usize()];
        disk.read_page(bitmap_physical_page(extent_id), &mut frame.data[..])?;
        frame.extent_id = Some(extent_id);
        frame.is_dirty = false;

        self.table.insert(extent_id, frame_id);
        self.replacer.unpin(frame_id);
        Ok(frame_id)
    }

    /// Installs an empty bitmap for a newly created extent.
    fn install_empty(&mut self, disk: &DiskManager, extent_id: u32) -> Result<FrameId> {
        let frame_id = self.take_frame(disk)?;
        let frame = &mut self.frames[frame_id.as_usize()];
        BitmapPage::new(&mut frame.data[..]).init();
        frame.extent_id = Some(extent_id);
        frame.is_dirty = true;

        self.table.insert(extent_id, frame_id);
        self.replacer.unpin(frame_id);
        Ok(frame_id)
    }

    fn flush(&mut self, disk: &DiskManager) -> Result<()> {
        for frame in self.frames.iter_mut() {
            if let (Some(extent_id), true) = (frame.extent_id, frame.is_dirty) {
                disk.write_page(bitmap_physical_page(extent_id), &frame.data[..])?;
                frame.is_dirty = false;
            }
        }
        Ok(())
    }
}

struct SpaceState {
    meta: Box<[u8; PAGE_SIZE]>,
    meta_dirty: bool,
    bitmaps: BitmapCache,
}

impl SpaceState {
    fn meta(&self) -> FileMetaPage<&[u8]> {
        FileMetaPage::new(&self.meta[..])
    }

    fn meta_mut(&mut self) -> FileMetaPage<&mut [u8]> {
        self.meta_dirty = true;
        FileMetaPage::new(&mut self.meta[..])
    }

    fn is_page_free(&mut self, disk: &DiskManager, page_id: PageId) -> Result<bool> {
        let (extent_id, offset) = split_page_id(page_id);
        if extent_id >= self.meta().num_extents() {
            return Ok(true);
        }
        let frame_id = self.bitmaps.load(disk, extent_id)?;
        let frame = &self.bitmaps.frames[frame_id.as_usize()];
        Ok(BitmapPage::new(&frame.data[..]).is_page_free(offset))
    }
}

/// DiskSpaceManager maps a dense logical page id space onto the database
/// file. Logical pages are grouped into extents of `BITMAP_CAPACITY` pages,
/// each governed by one bitmap page; physical page 0 is the file meta page.
///
/// Bitmap pages are cached privately under the manager's own mutex, so
/// allocation never goes through the main buffer pool.
pub struct DiskSpaceManager {
    disk: DiskManager,
    state: Mutex<SpaceState>,
}

impl DiskSpaceManager {
    /// Opens (or creates) a database file with default settings.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_config(db_path, &DiskConfig::default())
    }

    /// Opens (or creates) a database file, sizing the private bitmap cache
    /// from `config`. An existing file must carry a valid meta page.
    pub fn with_config<P: AsRef<Path>>(db_path: P, config: &DiskConfig) -> Result<Self> {
        config.validate()?;
        let disk = DiskManager::new(db_path)?;

        let mut meta = Box::new([0u8; PAGE_SIZE]);
        disk.read_page(META_PHYSICAL_PAGE, &mut meta[..])?;

        let mut meta_dirty = false;
        {
            let mut view = FileMetaPage::new(&mut meta[..]);
            if view.is_blank() {
                view.init();
                meta_dirty = true;
            } else if !view.is_valid() {
                return Err(StrataError::InvalidDatabaseFile);
            }
        }

        let manager = Self {
            disk,
            state: Mutex::new(SpaceState {
                meta,
                meta_dirty,
                bitmaps: BitmapCache::new(config.bitmap_cache_frames),
            }),
        };
        manager.flush()?;
        Ok(manager)
    }

    fn check_range(page_id: PageId) -> Result<()> {
        if !page_id.is_valid() || page_id.as_u32() as u64 >= MAX_LOGICAL_PAGES {
            return Err(StrataError::InvalidPageId(page_id));
        }
        Ok(())
    }

    fn check_buffer(len: usize) -> Result<()> {
        if len != PAGE_SIZE {
            return Err(StrataError::InvalidBufferSize(len));
        }
        Ok(())
    }

    /// Allocates the first free page of the first extent that is not full,
    /// growing the file by one extent when every extent is full.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut state = self.state.lock();

        let (num_extents, hint) = {
            let meta = state.meta();
            (meta.num_extents(), meta.next_free_extent())
        };

        let extent_id = if hint < num_extents {
            hint
        } else {
            if num_extents >= MAX_EXTENTS {
                warn!(num_extents, "extent limit reached, cannot allocate page");
                return Err(StrataError::DiskFull);
            }
            state.bitmaps.install_empty(&self.disk, num_extents)?;
            let mut meta = state.meta_mut();
            meta.set_num_extents(num_extents + 1);
            meta.set_extent_used_pages(num_extents, 0);
            debug!(extent_id = num_extents, "grew database file by one extent");
            num_extents
        };

        let frame_id = state.bitmaps.load(&self.disk, extent_id)?;
        let frame = &mut state.bitmaps.frames[frame_id.as_usize()];
        let offset = BitmapPage::new(&mut frame.data[..])
            .allocate_page()
            .ok_or_else(|| {
                StrataError::SpaceMapCorrupted(format!(
                    "extent {} is marked not full but its bitmap has no free slot",
                    extent_id
                ))
            })?;
        frame.is_dirty = true;

        let mut meta = state.meta_mut();
        let used = meta.extent_used_pages(extent_id) + 1;
        meta.set_extent_used_pages(extent_id, used);
        let allocated = meta.num_allocated_pages() + 1;
        meta.set_num_allocated_pages(allocated);
        if used >= BITMAP_CAPACITY {
            let next = meta
                .find_not_full_extent(extent_id + 1)
                .unwrap_or_else(|| meta.num_extents());
            meta.set_next_free_extent(next);
        }

        Ok(PageId::new(extent_id * BITMAP_CAPACITY + offset))
    }

    /// Frees a logical page. Freeing a page that is already free is an
    /// invariant violation.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        Self::check_range(page_id)?;
        let (extent_id, offset) = split_page_id(page_id);

        let mut state = self.state.lock();
        if extent_id >= state.meta().num_extents() {
            return Err(StrataError::PageAlreadyFree(page_id));
        }

        let frame_id = state.bitmaps.load(&self.disk, extent_id)?;
        let frame = &mut state.bitmaps.frames[frame_id.as_usize()];
        if !BitmapPage::new(&mut frame.data[..]).deallocate_page(offset) {
            return Err(StrataError::PageAlreadyFree(page_id));
        }
        frame.is_dirty = true;

        let mut meta = state.meta_mut();
        let used = meta.extent_used_pages(extent_id) - 1;
        meta.set_extent_used_pages(extent_id, used);
        let allocated = meta.num_allocated_pages() - 1;
        meta.set_num_allocated_pages(allocated);
        if extent_id < meta.next_free_extent() {
            meta.set_next_free_extent(extent_id);
        }
        Ok(())
    }

    /// Returns whether a logical page is unallocated. Ids past the last
    /// extent are free.
    pub fn is_page_free(&self, page_id: PageId) -> Result<bool> {
        Self::check_range(page_id)?;
        let mut state = self.state.lock();
        state.is_page_free(&self.disk, page_id)
    }

    /// Reads a logical page. A free page reads back as zeros.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        Self::check_buffer(data.len())?;
        if self.is_page_free(page_id)? {
            trace!(%page_id, "read of free page returns zeros");
            data.fill(0);
            return Ok(());
        }
        self.disk.read_page(physical_page_of(page_id), data)
    }

    /// Writes a logical page. Writes to a free page are dropped.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        Self::check_buffer(data.len())?;
        if self.is_page_free(page_id)? {
            trace!(%page_id, "dropping write to free page");
            return Ok(());
        }
        self.disk.write_page(physical_page_of(page_id), data)
    }

    /// Persists the meta page and every dirty cached bitmap page.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.bitmaps.flush(&self.disk)?;
        if state.meta_dirty {
            self.disk.write_page(META_PHYSICAL_PAGE, &state.meta[..])?;
            state.meta_dirty = false;
        }
        self.disk.sync()
    }

    /// Returns the number of logical pages currently allocated.
    pub fn num_allocated_pages(&self) -> u32 {
        self.state.lock().meta().num_allocated_pages()
    }

    /// Returns the number of extents the file has grown to.
    pub fn num_extents(&self) -> u32 {
        self.state.lock().meta().num_extents()
    }

    /// Returns the number of physical page reads, bitmap and meta pages
    /// included.
    pub fn num_reads(&self) -> u32 {
        self.disk.get_num_reads()
    }

    /// Returns the number of physical page writes.
    pub fn num_writes(&self) -> u32 {
        self.disk.get_num_writes()
    }
}

impl Drop for DiskSpaceManager {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "failed to flush space metadata on close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_physical_mapping() {
        assert_eq!(physical_page_of(PageId::new(0)), 2);
        assert_eq!(physical_page_of(PageId::new(5)), 7);
        assert_eq!(
            physical_page_of(PageId::new(BITMAP_CAPACITY)),
            bitmap_physical_page(1) + 1
        );
        assert_eq!(bitmap_physical_page(1), BITMAP_CAPACITY + 2);
    }

    #[test]
    fn test_allocate_and_free() {
        let temp_file = NamedTempFile::new().unwrap();
        let dsm = DiskSpaceManager::new(temp_file.path()).unwrap();

        let p0 = dsm.allocate_page().unwrap();
        let p1 = dsm.allocate_page().unwrap();
        assert_eq!(p0, PageId::new(0));
        assert_eq!(p1, PageId::new(1));
        assert!(!dsm.is_page_free(p0).unwrap());
        assert_eq!(dsm.num_allocated_pages(), 2);
        assert_eq!(dsm.num_extents(), 1);

        dsm.deallocate_page(p0).unwrap();
        assert!(dsm.is_page_free(p0).unwrap());
        assert_eq!(dsm.allocate_page().unwrap(), p0);
    }

    #[test]
    fn test_double_free_is_invariant_violation() {
        let temp_file = NamedTempFile::new().unwrap();
        let dsm = DiskSpaceManager::new(temp_file.path()).unwrap();

        let page_id = dsm.allocate_page().unwrap();
        dsm.deallocate_page(page_id).unwrap();

        let err = dsm.deallocate_page(page_id).unwrap_err();
        assert!(matches!(err, StrataError::PageAlreadyFree(_)));
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_bitmap_cache_eviction_keeps_state() {
        let temp_file = NamedTempFile::new().unwrap();
        let config = DiskConfig {
            bitmap_cache_frames: 1,
        };
        let dsm = DiskSpaceManager::with_config(temp_file.path(), &config).unwrap();

        // Fill the first extent and spill into a second; the single cache
        // frame has to write extent 0's bitmap back to make room.
        for _ in 0..=BITMAP_CAPACITY {
            dsm.allocate_page().unwrap();
        }
        assert_eq!(dsm.num_extents(), 2);

        assert!(!dsm.is_page_free(PageId::new(0)).unwrap());
        assert!(!dsm.is_page_free(PageId::new(BITMAP_CAPACITY)).unwrap());
        assert!(dsm.is_page_free(PageId::new(BITMAP_CAPACITY + 1)).unwrap());

        // Freeing in the first extent sends allocation back there.
        dsm.deallocate_page(PageId::new(5)).unwrap();
        assert_eq!(dsm.allocate_page().unwrap(), PageId::new(5));
        assert_eq!(dsm.allocate_page().unwrap(), PageId::new(BITMAP_CAPACITY + 1));
    }
}
