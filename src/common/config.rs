use serde::{Deserialize, Serialize};

use crate::buffer::ReplacerKind;

use super::error::{Result, StrataError};
use super::types::PageId;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Bytes at the front of a bitmap page used by its counters.
pub const BITMAP_HEADER_SIZE: usize = 8;

/// Number of data pages one extent bitmap page can track.
pub const BITMAP_CAPACITY: u32 = ((PAGE_SIZE - BITMAP_HEADER_SIZE) * 8) as u32;

/// Bytes at the front of the file meta page before the per-extent counters.
pub const META_HEADER_SIZE: usize = 20;

/// Maximum number of extents the file meta page can describe.
pub const MAX_EXTENTS: u32 = ((PAGE_SIZE - META_HEADER_SIZE) / 4) as u32;

/// Largest logical page id the space manager can ever hand out, plus one.
pub const MAX_LOGICAL_PAGES: u64 = MAX_EXTENTS as u64 * BITMAP_CAPACITY as u64;

/// Logical page conventionally holding the catalog metadata.
pub const CATALOG_META_PAGE_ID: PageId = PageId(0);

/// Logical page conventionally holding the index roots registry.
pub const INDEX_ROOTS_PAGE_ID: PageId = PageId(1);

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Default number of bitmap pages cached by the disk space manager
pub const DEFAULT_BITMAP_CACHE_FRAMES: usize = 8;

/// Buffer pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Number of in-memory frames.
    pub pool_size: usize,
    /// Victim selection policy.
    pub replacer: ReplacerKind,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_BUFFER_POOL_SIZE,
            replacer: ReplacerKind::Lru,
        }
    }
}

impl BufferPoolConfig {
    pub fn new(pool_size: usize, replacer: ReplacerKind) -> Self {
        Self {
            pool_size,
            replacer,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 || self.pool_size > u32::MAX as usize {
            return Err(StrataError::InvalidConfig(format!(
                "pool_size must be in 1..=u32::MAX, got {}",
                self.pool_size
            )));
        }
        Ok(())
    }
}

/// Disk space manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Frames in the private bitmap page cache.
    pub bitmap_cache_frames: usize,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            bitmap_cache_frames: DEFAULT_BITMAP_CACHE_FRAMES,
        }
    }
}

impl DiskConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bitmap_cache_frames == 0 {
            return Err(StrataError::InvalidConfig(
                "bitmap_cache_frames must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// B+ tree node sizing. `None` derives the size from what fits in a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BTreeConfig {
    pub leaf_max_size: Option<usize>,
    pub internal_max_size: Option<usize>,
}

impl BTreeConfig {
    pub fn with_max_sizes(leaf_max_size: usize, internal_max_size: usize) -> Self {
        Self {
            leaf_max_size: Some(leaf_max_size),
            internal_max_size: Some(internal_max_size),
        }
    }

    /// Resolves the effective (leaf, internal) max sizes, given how many
    /// entries of each node kind fit in a page.
    pub fn resolve(&self, leaf_cap: usize, internal_cap: usize) -> Result<(usize, usize)> {
        let leaf = self.leaf_max_size.unwrap_or(leaf_cap);
        let internal = self.internal_max_size.unwrap_or(internal_cap);

        // Leaves need at least two entries to split, internal nodes three
        // children so both halves keep a separator.
        if leaf < 2 || leaf > leaf_cap {
            return Err(StrataError::InvalidConfig(format!(
                "leaf_max_size must be in 2..={}, got {}",
                leaf_cap, leaf
            )));
        }
        if internal < 3 || internal > internal_cap {
            return Err(StrataError::InvalidConfig(format!(
                "internal_max_size must be in 3..={}, got {}",
                internal_cap, internal
            )));
        }
        Ok((leaf, internal))
    }
}
