use thiserror::Error;

use super::types::PageId;

/// Storage engine error types.
///
/// Variants fall into two classes: expected failures a caller is meant to
/// handle (pool exhaustion, missing pages, a full disk) and invariant
/// violations that indicate a bug in the caller or on-disk corruption.
/// [`StrataError::is_invariant_violation`] tells them apart.
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Page {0} is not allocated")]
    PageNotAllocated(PageId),

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Disk is full: extent limit reached")]
    DiskFull,

    #[error("Key size mismatch: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("Invalid page buffer size: {0} bytes")]
    InvalidBufferSize(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("Page {0} is already free")]
    PageAlreadyFree(PageId),

    #[error("Invalid database file")]
    InvalidDatabaseFile,

    #[error("Space map corrupted: {0}")]
    SpaceMapCorrupted(String),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),
}

impl StrataError {
    /// Returns true for errors that signal a broken invariant rather than
    /// an expected runtime condition.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            StrataError::PageStillPinned(_)
                | StrataError::PageAlreadyFree(_)
                | StrataError::InvalidDatabaseFile
                | StrataError::SpaceMapCorrupted(_)
                | StrataError::IndexCorrupted(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(!StrataError::BufferPoolFull.is_invariant_violation());
        assert!(!StrataError::PageNotAllocated(PageId::new(3)).is_invariant_violation());
        assert!(StrataError::PageStillPinned(PageId::new(3)).is_invariant_violation());
        assert!(StrataError::IndexCorrupted("bad".into()).is_invariant_violation());
    }
}
