use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{BTreeConfig, PageId, Result, RowId, StrataError, INVALID_PAGE_ID};

use super::btree_page::{
    internal_capacity, leaf_capacity, set_parent_page_id, InternalPage, LeafPage, NodeType,
};
use super::roots_page::IndexRootsPage;
use super::{BTreeIterator, KeyComparator};

/// Result of inserting into a subtree.
enum InsertOutcome {
    Duplicate,
    Inserted,
    /// The subtree root split; `right` must be linked into the parent
    /// under `separator`.
    Split { separator: Vec<u8>, right: PageId },
}

/// Result of removing from a subtree.
enum RemoveOutcome {
    NotFound,
    Removed { underflow: bool },
}

/// Where the tree records its root page id.
struct RootRegistry {
    page_id: PageId,
    index_id: u32,
}

/// Bookkeeping collected while verifying the tree.
#[derive(Default)]
struct VerifyState {
    leaf_depth: Option<usize>,
    /// (leaf, next pointer) in key order
    leaves: Vec<(PageId, PageId)>,
}

fn ensure(condition: bool, page_id: PageId, what: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(StrataError::IndexCorrupted(format!("page {}: {}", page_id, what)))
    }
}

/// A page the tree points at but the pool cannot produce is corruption,
/// not a lookup miss.
fn missing_page(page_id: PageId, err: StrataError) -> StrataError {
    match err {
        StrataError::PageNotAllocated(_) | StrataError::InvalidPageId(_) => {
            StrataError::IndexCorrupted(format!("tree references unallocated page {}", page_id))
        }
        other => other,
    }
}

/// B+ tree over fixed-width keys with unique-key semantics, mapping each key
/// to a [`RowId`]. Nodes live in buffer pool pages; the tree only ever holds
/// guards on a handful of pages at a time.
///
/// Mutations take `&mut self`; lookups and iterators take `&self`, so the
/// borrow checker keeps iterators from outliving a structural change.
pub struct BTreeIndex {
    root_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    comparator: Arc<dyn KeyComparator>,
    key_size: usize,
    leaf_max_size: usize,
    internal_max_size: usize,
    registry: Option<RootRegistry>,
}

impl BTreeIndex {
    /// Creates an empty tree. No page is allocated until the first insert.
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
        key_size: usize,
        config: &BTreeConfig,
    ) -> Result<Self> {
        if key_size == 0 {
            return Err(StrataError::InvalidConfig(
                "key_size must be at least 1".to_string(),
            ));
        }
        let (leaf_max_size, internal_max_size) =
            config.resolve(leaf_capacity(key_size), internal_capacity(key_size))?;
        Ok(Self {
            root_page_id: INVALID_PAGE_ID,
            bpm,
            comparator,
            key_size,
            leaf_max_size,
            internal_max_size,
            registry: None,
        })
    }

    /// Reattaches to an existing tree rooted at `root_page_id`.
    pub fn open(
        root_page_id: PageId,
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
        key_size: usize,
        config: &BTreeConfig,
    ) -> Result<Self> {
        let mut index = Self::new(bpm, comparator, key_size, config)?;
        index.root_page_id = root_page_id;
        index.check_root()?;
        Ok(index)
    }

    /// Records the root of this tree under `index_id` in the roots page at
    /// `registry_page`, keeping it current on every root change. A root
    /// already recorded for `index_id` is adopted; otherwise the current
    /// root is recorded.
    pub fn with_root_registry(mut self, registry_page: PageId, index_id: u32) -> Result<Self> {
        let recorded = {
            let guard = self.bpm.fetch_page_read(registry_page)?;
            IndexRootsPage::new(guard.data()).get_root(index_id)
        };

        self.registry = Some(RootRegistry {
            page_id: registry_page,
            index_id,
        });
        match recorded {
            Some(root) => {
                self.root_page_id = root;
                self.check_root()?;
            }
            None => self.persist_root()?,
        }
        Ok(self)
    }

    fn check_root(&self) -> Result<()> {
        if !self.root_page_id.is_valid() {
            return Ok(());
        }
        let guard = self.fetch_read(self.root_page_id)?;
        let key_size = match NodeType::of(guard.data())? {
            NodeType::Leaf => LeafPage::new(guard.data())?.key_size(),
            NodeType::Internal => InternalPage::new(guard.data())?.key_size(),
        };
        if key_size != self.key_size {
            return Err(StrataError::InvalidKeySize {
                expected: key_size,
                actual: self.key_size,
            });
        }
        Ok(())
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.is_valid()
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn leaf_max_size(&self) -> usize {
        self.leaf_max_size
    }

    pub fn internal_max_size(&self) -> usize {
        self.internal_max_size
    }

    pub fn bpm(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_size {
            return Err(StrataError::InvalidKeySize {
                expected: self.key_size,
                actual: key.len(),
            });
        }
        Ok(())
    }

    fn comparator(&self) -> &dyn KeyComparator {
        &*self.comparator
    }

    pub(super) fn fetch_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        self.bpm
            .fetch_page_read(page_id)
            .map_err(|e| missing_page(page_id, e))
    }

    fn fetch_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        self.bpm
            .fetch_page_write(page_id)
            .map_err(|e| missing_page(page_id, e))
    }

    fn free_page(&self, page_id: PageId) -> Result<()> {
        if !self.bpm.delete_page(page_id)? {
            return Err(StrataError::IndexCorrupted(format!(
                "tree page {} was already free",
                page_id
            )));
        }
        Ok(())
    }

    fn set_parent(&self, page_id: PageId, parent: PageId) -> Result<()> {
        let mut guard = self.fetch_write(page_id)?;
        set_parent_page_id(guard.data_mut(), parent);
        Ok(())
    }

    fn set_root(&mut self, root: PageId) -> Result<()> {
        debug!(old_root = %self.root_page_id, new_root = %root, "index root changed");
        self.root_page_id = root;
        self.persist_root()
    }

    fn persist_root(&self) -> Result<()> {
        let Some(registry) = &self.registry else {
            return Ok(());
        };

        let mut guard = self.bpm.fetch_page_write(registry.page_id)?;
        if !IndexRootsPage::new(guard.data_mut()).set_root(registry.index_id, self.root_page_id) {
            return Err(StrataError::InvalidConfig(format!(
                "index roots page {} has no room for index {}",
                registry.page_id, registry.index_id
            )));
        }
        Ok(())
    }

    /// Descends to the leaf that would hold `key`, or to the leftmost leaf
    /// when `key` is None. Only one page is pinned at a time.
    pub(super) fn find_leaf(&self, key: Option<&[u8]>) -> Result<Option<ReadPageGuard>> {
        if !self.root_page_id.is_valid() {
            return Ok(None);
        }

        let mut guard = self.fetch_read(self.root_page_id)?;
        loop {
            let node_type = NodeType::of(guard.data())?;
            let child = match node_type {
                NodeType::Leaf => return Ok(Some(guard)),
                NodeType::Internal => {
                    let node = InternalPage::new(guard.data())?;
                    let index = match key {
                        Some(key) => node.lookup(key, self.comparator()),
                        None => 0,
                    };
                    node.child_at(index)
                }
            };
            drop(guard);
            guard = self.fetch_read(child)?;
        }
    }

    /// Point lookup.
    pub fn get_value(&self, key: &[u8]) -> Result<Option<RowId>> {
        self.check_key(key)?;
        let Some(guard) = self.find_leaf(Some(key))? else {
            return Ok(None);
        };
        let leaf = LeafPage::new(guard.data())?;
        Ok(leaf
            .search(key, self.comparator())
            .ok()
            .map(|index| leaf.value_at(index)))
    }

    /// Inserts `key -> value`. Returns false, leaving the tree untouched, if
    /// the key is already present.
    pub fn insert(&mut self, key: &[u8], value: RowId) -> Result<bool> {
        self.check_key(key)?;

        if !self.root_page_id.is_valid() {
            self.start_new_tree(key, value)?;
            return Ok(true);
        }

        match self.insert_into(self.root_page_id, key, value)? {
            InsertOutcome::Duplicate => Ok(false),
            InsertOutcome::Inserted => Ok(true),
            InsertOutcome::Split { separator, right } => {
                self.grow_root(&separator, right)?;
                Ok(true)
            }
        }
    }

    fn start_new_tree(&mut self, key: &[u8], value: RowId) -> Result<()> {
        let root = {
            let mut guard = self.bpm.new_page()?;
            let page_id = guard.page_id();
            let mut leaf = LeafPage::init(
                guard.data_mut(),
                page_id,
                INVALID_PAGE_ID,
                self.leaf_max_size,
                self.key_size,
            );
            leaf.insert_at(0, key, value);
            page_id
        };
        self.set_root(root)
    }

    /// Puts a new internal root above the old root and its new sibling.
    fn grow_root(&mut self, separator: &[u8], right: PageId) -> Result<()> {
        let left = self.root_page_id;
        let root = {
            let mut guard = self.bpm.new_page()?;
            let page_id = guard.page_id();
            let mut node = InternalPage::init(
                guard.data_mut(),
                page_id,
                INVALID_PAGE_ID,
                self.internal_max_size,
                self.key_size,
            );
            node.populate_new_root(left, separator, right);
            page_id
        };

        self.set_parent(left, root)?;
        self.set_parent(right, root)?;
        self.set_root(root)
    }

    fn insert_into(&self, page_id: PageId, key: &[u8], value: RowId) -> Result<InsertOutcome> {
        let guard = self.fetch_write(page_id)?;
        let node_type = NodeType::of(guard.data())?;
        let child = match node_type {
            NodeType::Leaf => return self.insert_into_leaf(guard, key, value),
            NodeType::Internal => {
                let node = InternalPage::new(guard.data())?;
                node.child_at(node.lookup(key, self.comparator()))
            }
        };
        drop(guard);

        match self.insert_into(child, key, value)? {
            InsertOutcome::Split { separator, right } => {
                self.insert_into_internal(page_id, &separator, right)
            }
            outcome => Ok(outcome),
        }
    }

    fn insert_into_leaf(
        &self,
        mut guard: WritePageGuard,
        key: &[u8],
        value: RowId,
    ) -> Result<InsertOutcome> {
        let page_id = guard.page_id();
        let (index, full) = {
            let leaf = LeafPage::new(guard.data())?;
            match leaf.search(key, self.comparator()) {
                Ok(_) => return Ok(InsertOutcome::Duplicate),
                Err(index) => (index, leaf.size() >= leaf.max_size()),
            }
        };

        if !full {
            LeafPage::new(guard.data_mut())?.insert_at(index, key, value);
            return Ok(InsertOutcome::Inserted);
        }

        // Allocate first so a full pool leaves the leaf untouched.
        let mut sibling_guard = self.bpm.new_page()?;
        let sibling_id = sibling_guard.page_id();

        let mut leaf = LeafPage::new(guard.data_mut())?;
        leaf.insert_at(index, key, value);
        let mut sibling = LeafPage::init(
            sibling_guard.data_mut(),
            sibling_id,
            leaf.parent_page_id(),
            leaf.max_size(),
            self.key_size,
        );
        leaf.move_upper_half_to(&mut sibling);

        debug!(%page_id, %sibling_id, left_size = leaf.size(), right_size = sibling.size(), "split leaf");
        Ok(InsertOutcome::Split {
            separator: sibling.key_at(0).to_vec(),
            right: sibling_id,
        })
    }

    fn insert_into_internal(
        &self,
        page_id: PageId,
        separator: &[u8],
        right: PageId,
    ) -> Result<InsertOutcome> {
        let mut guard = self.fetch_write(page_id)?;
        let (index, full) = {
            let node = InternalPage::new(guard.data())?;
            (
                node.lookup(separator, self.comparator()) + 1,
                node.size() >= node.max_size(),
            )
        };

        if !full {
            InternalPage::new(guard.data_mut())?.insert_at(index, separator, right);
            return Ok(InsertOutcome::Inserted);
        }

        let mut sibling_guard = self.bpm.new_page()?;
        let sibling_id = sibling_guard.page_id();

        let (push_up, moved) = {
            let mut node = InternalPage::new(guard.data_mut())?;
            node.insert_at(index, separator, right);
            let mut sibling = InternalPage::init(
                sibling_guard.data_mut(),
                sibling_id,
                node.parent_page_id(),
                node.max_size(),
                self.key_size,
            );
            let moved = node.move_upper_half_to(&mut sibling);
            (sibling.key_at(0).to_vec(), moved)
        };
        drop(sibling_guard);
        drop(guard);

        for child in moved {
            self.set_parent(child, sibling_id)?;
        }

        debug!(%page_id, %sibling_id, "split internal node");
        Ok(InsertOutcome::Split {
            separator: push_up,
            right: sibling_id,
        })
    }

    /// Removes `key`. Returns false if it was not present.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool> {
        self.check_key(key)?;

        if !self.root_page_id.is_valid() {
            return Ok(false);
        }

        match self.remove_from(self.root_page_id, key)? {
            RemoveOutcome::NotFound => Ok(false),
            RemoveOutcome::Removed { .. } => {
                self.shrink_root()?;
                Ok(true)
            }
        }
    }

    fn remove_from(&self, page_id: PageId, key: &[u8]) -> Result<RemoveOutcome> {
        let mut guard = self.fetch_write(page_id)?;
        let node_type = NodeType::of(guard.data())?;
        let (index, child) = match node_type {
            NodeType::Leaf => {
                let found = LeafPage::new(guard.data())?.search(key, self.comparator());
                let Ok(index) = found else {
                    return Ok(RemoveOutcome::NotFound);
                };
                let mut leaf = LeafPage::new(guard.data_mut())?;
                leaf.remove_at(index);
                return Ok(RemoveOutcome::Removed {
                    underflow: leaf.size() < leaf.min_size(),
                });
            }
            NodeType::Internal => {
                let node = InternalPage::new(guard.data())?;
                let index = node.lookup(key, self.comparator());
                (index, node.child_at(index))
            }
        };
        drop(guard);

        match self.remove_from(child, key)? {
            RemoveOutcome::Removed { underflow: true } => {
                let underflow = self.rebalance(page_id, index)?;
                Ok(RemoveOutcome::Removed { underflow })
            }
            outcome => Ok(outcome),
        }
    }

    /// Fixes an underflowing child of `parent_id` by merging it with a
    /// sibling (the left one when it exists) or, if the two do not fit in
    /// one node, borrowing one entry from that sibling. Returns whether the
    /// parent itself now underflows.
    fn rebalance(&self, parent_id: PageId, child_index: usize) -> Result<bool> {
        let mut parent_guard = self.fetch_write(parent_id)?;
        let (left_index, left_id, right_id, separator) = {
            let parent = InternalPage::new(parent_guard.data())?;
            ensure(parent.size() >= 2, parent_id, "internal node has a single child")?;
            let left_index = child_index.saturating_sub(1);
            (
                left_index,
                parent.child_at(left_index),
                parent.child_at(left_index + 1),
                parent.key_at(left_index + 1).to_vec(),
            )
        };
        let right_index = left_index + 1;
        let underflow_is_left = child_index == 0;

        let mut left_guard = self.fetch_write(left_id)?;
        let mut right_guard = self.fetch_write(right_id)?;
        let node_type = NodeType::of(left_guard.data())?;

        let mut parent = InternalPage::new(parent_guard.data_mut())?;
        let mut moved: Vec<(PageId, PageId)> = Vec::new();
        let merged = match node_type {
            NodeType::Leaf => {
                let mut left = LeafPage::new(left_guard.data_mut())?;
                let mut right = LeafPage::new(right_guard.data_mut())?;
                if left.size() + right.size() <= left.max_size() {
                    right.move_all_to(&mut left);
                    parent.remove_at(right_index);
                    true
                } else {
                    if underflow_is_left {
                        right.move_first_to_end_of(&mut left);
                    } else {
                        left.move_last_to_front_of(&mut right);
                    }
                    parent.set_key_at(right_index, right.key_at(0));
                    false
                }
            }
            NodeType::Internal => {
                let mut left = InternalPage::new(left_guard.data_mut())?;
                let mut right = InternalPage::new(right_guard.data_mut())?;
                if left.size() + right.size() <= left.max_size() {
                    moved.extend(
                        right
                            .move_all_to(&mut left, &separator)
                            .into_iter()
                            .map(|child| (child, left_id)),
                    );
                    parent.remove_at(right_index);
                    true
                } else {
                    if underflow_is_left {
                        let child = right.move_first_to_end_of(&mut left, &separator);
                        moved.push((child, left_id));
                    } else {
                        let child = left.move_last_to_front_of(&mut right, &separator);
                        moved.push((child, right_id));
                    }
                    parent.set_key_at(right_index, right.key_at(0));
                    false
                }
            }
        };
        let parent_underflow = parent.size() < parent.min_size();

        drop(right_guard);
        drop(left_guard);
        drop(parent_guard);

        if merged {
            self.free_page(right_id)?;
            debug!(%parent_id, %left_id, %right_id, "merged siblings");
        } else {
            debug!(%parent_id, %left_id, %right_id, "redistributed entry between siblings");
        }

        for (child, new_parent) in moved {
            self.set_parent(child, new_parent)?;
        }
        Ok(parent_underflow)
    }

    /// After a removal: an empty root leaf is freed and the tree becomes
    /// empty; an internal root left with one child is replaced by it.
    fn shrink_root(&mut self) -> Result<()> {
        let old_root = self.root_page_id;
        let new_root = {
            let guard = self.fetch_read(old_root)?;
            match NodeType::of(guard.data())? {
                NodeType::Leaf => {
                    if LeafPage::new(guard.data())?.size() > 0 {
                        return Ok(());
                    }
                    INVALID_PAGE_ID
                }
                NodeType::Internal => {
                    let node = InternalPage::new(guard.data())?;
                    if node.size() > 1 {
                        return Ok(());
                    }
                    node.child_at(0)
                }
            }
        };

        if new_root.is_valid() {
            self.set_parent(new_root, INVALID_PAGE_ID)?;
        }
        self.free_page(old_root)?;
        self.set_root(new_root)
    }

    /// Iterator over every entry in key order.
    pub fn iter(&self) -> Result<BTreeIterator<'_>> {
        let leaf = self.find_leaf(None)?;
        Ok(BTreeIterator::new(self, leaf, 0))
    }

    /// Iterator starting at `key`, or an exhausted iterator if `key` is absent.
    pub fn iter_from(&self, key: &[u8]) -> Result<BTreeIterator<'_>> {
        self.check_key(key)?;
        let Some(guard) = self.find_leaf(Some(key))? else {
            return Ok(BTreeIterator::end(self));
        };
        let found = LeafPage::new(guard.data())?.search(key, self.comparator());
        match found {
            Ok(index) => Ok(BTreeIterator::new(self, Some(guard), index)),
            Err(_) => Ok(BTreeIterator::end(self)),
        }
    }

    /// Iterator starting at the first key `>= key`.
    pub fn iter_lower_bound(&self, key: &[u8]) -> Result<BTreeIterator<'_>> {
        self.check_key(key)?;
        let Some(guard) = self.find_leaf(Some(key))? else {
            return Ok(BTreeIterator::end(self));
        };
        let index = match LeafPage::new(guard.data())?.search(key, self.comparator()) {
            Ok(index) | Err(index) => index,
        };
        Ok(BTreeIterator::new(self, Some(guard), index))
    }

    /// Entries with `start <= key <= end`, in key order.
    pub fn range_scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, RowId)>> {
        self.check_key(end)?;
        let mut entries = Vec::new();
        for entry in self.iter_lower_bound(start)? {
            let (key, value) = entry?;
            if self.comparator().compare(&key, end) == Ordering::Greater {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// Number of levels; 0 for an empty tree.
    pub fn height(&self) -> Result<usize> {
        if !self.root_page_id.is_valid() {
            return Ok(0);
        }

        let mut height = 1;
        let mut page_id = self.root_page_id;
        loop {
            let guard = self.fetch_read(page_id)?;
            match NodeType::of(guard.data())? {
                NodeType::Leaf => return Ok(height),
                NodeType::Internal => {
                    page_id = InternalPage::new(guard.data())?.child_at(0);
                    height += 1;
                }
            }
        }
    }

    /// Frees every page of the tree and leaves it empty.
    pub fn destroy(&mut self) -> Result<()> {
        if self.root_page_id.is_valid() {
            self.destroy_subtree(self.root_page_id)?;
        }
        debug!(root = %self.root_page_id, "destroyed index");
        self.root_page_id = INVALID_PAGE_ID;

        if let Some(registry) = &self.registry {
            let mut guard = self.bpm.fetch_page_write(registry.page_id)?;
            IndexRootsPage::new(guard.data_mut()).remove(registry.index_id);
        }
        Ok(())
    }

    fn destroy_subtree(&self, page_id: PageId) -> Result<()> {
        let children: Vec<PageId> = {
            let guard = self.fetch_read(page_id)?;
            match NodeType::of(guard.data())? {
                NodeType::Leaf => Vec::new(),
                NodeType::Internal => {
                    let node = InternalPage::new(guard.data())?;
                    (0..node.size()).map(|i| node.child_at(i)).collect()
                }
            }
        };

        for child in children {
            self.destroy_subtree(child)?;
        }
        self.free_page(page_id)
    }

    /// Walks the whole tree checking key order and bounds, node occupancy,
    /// parent pointers, uniform leaf depth and the leaf chain. Returns the
    /// number of entries.
    pub fn verify(&self) -> Result<usize> {
        if !self.root_page_id.is_valid() {
            return Ok(0);
        }

        let mut state = VerifyState::default();
        let count = self.verify_node(
            self.root_page_id,
            INVALID_PAGE_ID,
            None,
            None,
            1,
            &mut state,
        )?;

        for pair in state.leaves.windows(2) {
            let ((leaf, next), (following, _)) = (pair[0], pair[1]);
            ensure(next == following, leaf, "leaf chain skips a leaf")?;
        }
        if let Some(&(last, next)) = state.leaves.last() {
            ensure(!next.is_valid(), last, "last leaf has a next pointer")?;
        }
        Ok(count)
    }

    fn check_keys<'k>(
        &self,
        page_id: PageId,
        keys: impl Iterator<Item = &'k [u8]>,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> Result<()> {
        let mut previous: Option<&[u8]> = None;
        for key in keys {
            if let Some(previous) = previous {
                ensure(
                    self.comparator().compare(previous, key) == Ordering::Less,
                    page_id,
                    "keys out of order",
                )?;
            }
            if let Some(lower) = lower {
                ensure(
                    self.comparator().compare(key, lower) != Ordering::Less,
                    page_id,
                    "key below subtree lower bound",
                )?;
            }
            if let Some(upper) = upper {
                ensure(
                    self.comparator().compare(key, upper) == Ordering::Less,
                    page_id,
                    "key at or above subtree upper bound",
                )?;
            }
            previous = Some(key);
        }
        Ok(())
    }

    fn verify_node(
        &self,
        page_id: PageId,
        parent: PageId,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        depth: usize,
        state: &mut VerifyState,
    ) -> Result<usize> {
        let is_root = !parent.is_valid();
        let guard = self.fetch_read(page_id)?;

        match NodeType::of(guard.data())? {
            NodeType::Leaf => {
                let leaf = LeafPage::new(guard.data())?;
                ensure(leaf.page_id() == page_id, page_id, "header page id mismatch")?;
                ensure(leaf.parent_page_id() == parent, page_id, "wrong parent pointer")?;
                ensure(leaf.key_size() == self.key_size, page_id, "wrong key size")?;
                ensure(leaf.size() <= leaf.max_size(), page_id, "leaf overfull")?;
                let floor = if is_root { 1 } else { leaf.min_size() };
                ensure(leaf.size() >= floor, page_id, "leaf underfull")?;
                self.check_keys(page_id, (0..leaf.size()).map(|i| leaf.key_at(i)), lower, upper)?;

                match state.leaf_depth {
                    Some(leaf_depth) => ensure(leaf_depth == depth, page_id, "leaves at different depths")?,
                    None => state.leaf_depth = Some(depth),
                }
                state.leaves.push((page_id, leaf.next_page_id()));
                Ok(leaf.size())
            }
            NodeType::Internal => {
                let (keys, children) = {
                    let node = InternalPage::new(guard.data())?;
                    ensure(node.page_id() == page_id, page_id, "header page id mismatch")?;
                    ensure(node.parent_page_id() == parent, page_id, "wrong parent pointer")?;
                    ensure(node.key_size() == self.key_size, page_id, "wrong key size")?;
                    ensure(node.size() <= node.max_size(), page_id, "internal node overfull")?;
                    let floor = if is_root { 2 } else { node.min_size() };
                    ensure(node.size() >= floor, page_id, "internal node underfull")?;
                    self.check_keys(page_id, (1..node.size()).map(|i| node.key_at(i)), lower, upper)?;

                    let keys: Vec<Vec<u8>> = (0..node.size()).map(|i| node.key_at(i).to_vec()).collect();
                    let children: Vec<PageId> = (0..node.size()).map(|i| node.child_at(i)).collect();
                    (keys, children)
                };
                drop(guard);

                let mut count = 0;
                for (i, &child) in children.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(keys[i].as_slice()) };
                    let child_upper = match keys.get(i + 1) {
                        Some(key) => Some(key.as_slice()),
                        None => upper,
                    };
                    count += self.verify_node(child, page_id, child_lower, child_upper, depth + 1, state)?;
                }
                Ok(count)
            }
        }
    }
}
