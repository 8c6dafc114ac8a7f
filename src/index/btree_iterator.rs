use crate::buffer::ReadPageGuard;
use crate::common::{Result, RowId};

use super::btree_page::LeafPage;
use super::BTreeIndex;

/// Forward iterator over the leaf chain of a [`BTreeIndex`].
///
/// Holds exactly one leaf pinned (under its read latch) while positioned on
/// it; the pin moves to the next leaf when the current one is exhausted and
/// is released once the end is reached or the iterator is dropped.
pub struct BTreeIterator<'a> {
    index: &'a BTreeIndex,
    leaf: Option<ReadPageGuard>,
    offset: usize,
}

impl<'a> BTreeIterator<'a> {
    pub(super) fn new(index: &'a BTreeIndex, leaf: Option<ReadPageGuard>, offset: usize) -> Self {
        Self {
            index,
            leaf,
            offset,
        }
    }

    pub(super) fn end(index: &'a BTreeIndex) -> Self {
        Self::new(index, None, 0)
    }

    /// True once the iterator holds no leaf.
    pub fn is_end(&self) -> bool {
        self.leaf.is_none()
    }

    fn advance(&mut self) -> Result<Option<(Vec<u8>, RowId)>> {
        loop {
            let Some(guard) = &self.leaf else {
                return Ok(None);
            };

            let next_page_id = {
                let leaf = LeafPage::new(guard.data())?;
                if self.offset < leaf.size() {
                    let entry = (leaf.key_at(self.offset).to_vec(), leaf.value_at(self.offset));
                    self.offset += 1;
                    return Ok(Some(entry));
                }
                leaf.next_page_id()
            };

            // Unpin before following the chain.
            self.leaf = None;
            self.offset = 0;
            if next_page_id.is_valid() {
                self.leaf = Some(self.index.fetch_read(next_page_id)?);
            }
        }
    }
}

impl Iterator for BTreeIterator<'_> {
    type Item = Result<(Vec<u8>, RowId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.leaf = None;
                Some(Err(e))
            }
        }
    }
}
