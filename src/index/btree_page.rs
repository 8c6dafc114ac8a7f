use std::cmp::Ordering;

use crate::common::{PageId, Result, RowId, StrataError, INVALID_PAGE_ID, PAGE_SIZE};

use super::KeyComparator;

// Common header, shared by both node kinds
const PAGE_TYPE_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;
const MAX_SIZE_OFFSET: usize = 8;
const KEY_SIZE_OFFSET: usize = 12;
const PARENT_OFFSET: usize = 16;
const PAGE_ID_OFFSET: usize = 20;
// Leaf only
const NEXT_PAGE_OFFSET: usize = 24;

pub const INTERNAL_HEADER_SIZE: usize = 24;
pub const LEAF_HEADER_SIZE: usize = 28;

const CHILD_SIZE: usize = 4;

const LEAF_TAG: u8 = 1;
const INTERNAL_TAG: u8 = 2;

/// Largest leaf max_size for `key_size`-byte keys. One extra entry slot is
/// always left free so a node can briefly hold `max_size + 1` entries.
pub fn leaf_capacity(key_size: usize) -> usize {
    ((PAGE_SIZE - LEAF_HEADER_SIZE) / (key_size + RowId::ENCODED_SIZE)).saturating_sub(1)
}

/// Largest internal max_size for `key_size`-byte keys.
pub fn internal_capacity(key_size: usize) -> usize {
    ((PAGE_SIZE - INTERNAL_HEADER_SIZE) / (key_size + CHILD_SIZE)).saturating_sub(1)
}

/// Occupancy floor for a non-root node: `max_size / 2`, rounded up.
pub fn min_size(max_size: usize) -> usize {
    (max_size + 1) / 2
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Node discriminant stored in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Leaf,
    Internal,
}

impl NodeType {
    /// Reads the discriminant of a tree page.
    pub fn of(data: &[u8]) -> Result<Self> {
        match data[PAGE_TYPE_OFFSET] {
            LEAF_TAG => Ok(NodeType::Leaf),
            INTERNAL_TAG => Ok(NodeType::Internal),
            tag => Err(StrataError::IndexCorrupted(format!(
                "page {} has unknown node type {}",
                PageId::new(read_u32(data, PAGE_ID_OFFSET)),
                tag
            ))),
        }
    }
}

pub fn parent_page_id(data: &[u8]) -> PageId {
    PageId::new(read_u32(data, PARENT_OFFSET))
}

pub fn set_parent_page_id(data: &mut [u8], parent: PageId) {
    write_u32(data, PARENT_OFFSET, parent.as_u32());
}

fn init_header(
    data: &mut [u8],
    tag: u8,
    page_id: PageId,
    parent: PageId,
    max_size: usize,
    key_size: usize,
) {
    data.fill(0);
    data[PAGE_TYPE_OFFSET] = tag;
    write_u32(data, SIZE_OFFSET, 0);
    write_u32(data, MAX_SIZE_OFFSET, max_size as u32);
    write_u32(data, KEY_SIZE_OFFSET, key_size as u32);
    write_u32(data, PARENT_OFFSET, parent.as_u32());
    write_u32(data, PAGE_ID_OFFSET, page_id.as_u32());
}

/// Validates a page header against the expected node kind and returns the
/// key size.
fn check_header(data: &[u8], expected: NodeType, capacity: fn(usize) -> usize) -> Result<usize> {
    if data.len() != PAGE_SIZE {
        return Err(StrataError::IndexCorrupted(format!(
            "tree page buffer is {} bytes",
            data.len()
        )));
    }

    let page_id = PageId::new(read_u32(data, PAGE_ID_OFFSET));
    let actual = NodeType::of(data)?;
    if actual != expected {
        return Err(StrataError::IndexCorrupted(format!(
            "page {} is a {:?} node, expected {:?}",
            page_id, actual, expected
        )));
    }

    let key_size = read_u32(data, KEY_SIZE_OFFSET) as usize;
    let size = read_u32(data, SIZE_OFFSET) as usize;
    if key_size == 0 || key_size >= PAGE_SIZE || size > capacity(key_size) + 1 {
        return Err(StrataError::IndexCorrupted(format!(
            "page {} has an impossible header (key_size {}, size {})",
            page_id, key_size, size
        )));
    }
    Ok(key_size)
}

/// Leaf node view: a header followed by sorted `(key, RowId)` entries.
pub struct LeafPage<B> {
    data: B,
    key_size: usize,
}

impl<B: AsRef<[u8]>> LeafPage<B> {
    pub fn new(data: B) -> Result<Self> {
        let key_size = check_header(data.as_ref(), NodeType::Leaf, leaf_capacity)?;
        Ok(Self { data, key_size })
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn entry_size(&self) -> usize {
        self.key_size + RowId::ENCODED_SIZE
    }

    fn entry_offset(&self, index: usize) -> usize {
        LEAF_HEADER_SIZE + index * self.entry_size()
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(read_u32(self.bytes(), PAGE_ID_OFFSET))
    }

    pub fn parent_page_id(&self) -> PageId {
        parent_page_id(self.bytes())
    }

    pub fn next_page_id(&self) -> PageId {
        PageId::new(read_u32(self.bytes(), NEXT_PAGE_OFFSET))
    }

    pub fn size(&self) -> usize {
        read_u32(self.bytes(), SIZE_OFFSET) as usize
    }

    pub fn max_size(&self) -> usize {
        read_u32(self.bytes(), MAX_SIZE_OFFSET) as usize
    }

    pub fn min_size(&self) -> usize {
        min_size(self.max_size())
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        let offset = self.entry_offset(index);
        &self.bytes()[offset..offset + self.key_size]
    }

    pub fn value_at(&self, index: usize) -> RowId {
        let offset = self.entry_offset(index) + self.key_size;
        RowId::decode(&self.bytes()[offset..offset + RowId::ENCODED_SIZE])
    }

    /// Binary search: `Ok(index)` on an exact match, otherwise `Err` with
    /// the position where `key` would be inserted.
    pub fn search(&self, key: &[u8], cmp: &dyn KeyComparator) -> std::result::Result<usize, usize> {
        let mut lo = 0;
        let mut hi = self.size();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match cmp.compare(self.key_at(mid), key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(mid),
            }
        }
        Err(lo)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> LeafPage<B> {
    /// Formats `data` as an empty leaf.
    pub fn init(mut data: B, page_id: PageId, parent: PageId, max_size: usize, key_size: usize) -> Self {
        let bytes = data.as_mut();
        init_header(bytes, LEAF_TAG, page_id, parent, max_size, key_size);
        write_u32(bytes, NEXT_PAGE_OFFSET, INVALID_PAGE_ID.as_u32());
        Self { data, key_size }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    fn set_size(&mut self, size: usize) {
        write_u32(self.bytes_mut(), SIZE_OFFSET, size as u32);
    }

    pub fn set_parent_page_id(&mut self, parent: PageId) {
        set_parent_page_id(self.bytes_mut(), parent);
    }

    pub fn set_next_page_id(&mut self, next: PageId) {
        write_u32(self.bytes_mut(), NEXT_PAGE_OFFSET, next.as_u32());
    }

    fn write_entry(&mut self, index: usize, key: &[u8], value: RowId) {
        let offset = self.entry_offset(index);
        let key_size = self.key_size;
        let bytes = self.bytes_mut();
        bytes[offset..offset + key_size].copy_from_slice(key);
        value.encode_into(&mut bytes[offset + key_size..offset + key_size + RowId::ENCODED_SIZE]);
    }

    /// Inserts an entry at `index`, shifting later entries right.
    pub fn insert_at(&mut self, index: usize, key: &[u8], value: RowId) {
        let size = self.size();
        debug_assert!(index <= size);
        let start = self.entry_offset(index);
        let end = self.entry_offset(size);
        let entry_size = self.entry_size();
        self.bytes_mut().copy_within(start..end, start + entry_size);
        self.write_entry(index, key, value);
        self.set_size(size + 1);
    }

    /// Removes the entry at `index`, shifting later entries left.
    pub fn remove_at(&mut self, index: usize) {
        let size = self.size();
        debug_assert!(index < size);
        let start = self.entry_offset(index + 1);
        let end = self.entry_offset(size);
        let dest = self.entry_offset(index);
        self.bytes_mut().copy_within(start..end, dest);
        self.set_size(size - 1);
    }

    /// Copies `count` entries from `source[from..]` to the end of this node.
    fn append_from<C: AsRef<[u8]>>(&mut self, source: &LeafPage<C>, from: usize, count: usize) {
        let size = self.size();
        let src = source.entry_offset(from);
        let len = count * self.entry_size();
        let dest = self.entry_offset(size);
        self.bytes_mut()[dest..dest + len].copy_from_slice(&source.bytes()[src..src + len]);
        self.set_size(size + count);
    }

    /// Split: keeps the lower `min_size` entries and moves the rest into the
    /// empty `recipient`, which is linked in after this leaf.
    pub fn move_upper_half_to<C: AsRef<[u8]> + AsMut<[u8]>>(&mut self, recipient: &mut LeafPage<C>) {
        let size = self.size();
        let keep = self.min_size();
        recipient.append_from(self, keep, size - keep);
        self.set_size(keep);

        recipient.set_next_page_id(self.next_page_id());
        let recipient_id = recipient.page_id();
        self.set_next_page_id(recipient_id);
    }

    /// Merge: appends every entry to `recipient`, the left sibling, and
    /// unlinks this leaf from the chain.
    pub fn move_all_to<C: AsRef<[u8]> + AsMut<[u8]>>(&mut self, recipient: &mut LeafPage<C>) {
        let size = self.size();
        recipient.append_from(self, 0, size);
        recipient.set_next_page_id(self.next_page_id());
        self.set_size(0);
    }

    /// Moves the first entry to the end of `recipient`, the left sibling.
    pub fn move_first_to_end_of<C: AsRef<[u8]> + AsMut<[u8]>>(&mut self, recipient: &mut LeafPage<C>) {
        recipient.append_from(self, 0, 1);
        self.remove_at(0);
    }

    /// Moves the last entry to the front of `recipient`, the right sibling.
    pub fn move_last_to_front_of<C: AsRef<[u8]> + AsMut<[u8]>>(&mut self, recipient: &mut LeafPage<C>) {
        let last = self.size() - 1;
        let value = self.value_at(last);
        recipient.insert_at(0, self.key_at(last), value);
        self.set_size(last);
    }
}

/// Internal node view: a header followed by `(key, child)` entries. The key
/// of entry 0 is a placeholder; child `i` covers keys in
/// `[key_at(i), key_at(i + 1))`.
pub struct InternalPage<B> {
    data: B,
    key_size: usize,
}

impl<B: AsRef<[u8]>> InternalPage<B> {
    pub fn new(data: B) -> Result<Self> {
        let key_size = check_header(data.as_ref(), NodeType::Internal, internal_capacity)?;
        Ok(Self { data, key_size })
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn entry_size(&self) -> usize {
        self.key_size + CHILD_SIZE
    }

    fn entry_offset(&self, index: usize) -> usize {
        INTERNAL_HEADER_SIZE + index * self.entry_size()
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(read_u32(self.bytes(), PAGE_ID_OFFSET))
    }

    pub fn parent_page_id(&self) -> PageId {
        parent_page_id(self.bytes())
    }

    /// Number of children.
    pub fn size(&self) -> usize {
        read_u32(self.bytes(), SIZE_OFFSET) as usize
    }

    pub fn max_size(&self) -> usize {
        read_u32(self.bytes(), MAX_SIZE_OFFSET) as usize
    }

    pub fn min_size(&self) -> usize {
        min_size(self.max_size())
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        let offset = self.entry_offset(index);
        &self.bytes()[offset..offset + self.key_size]
    }

    pub fn child_at(&self, index: usize) -> PageId {
        PageId::new(read_u32(self.bytes(), self.entry_offset(index) + self.key_size))
    }

    pub fn child_index(&self, child: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.child_at(i) == child)
    }

    /// Index of the child whose subtree may contain `key`: the last entry
    /// whose key is `<= key`, or 0.
    pub fn lookup(&self, key: &[u8], cmp: &dyn KeyComparator) -> usize {
        let mut lo = 1;
        let mut hi = self.size();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp.compare(self.key_at(mid), key) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo - 1
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> InternalPage<B> {
    /// Formats `data` as an empty internal node.
    pub fn init(mut data: B, page_id: PageId, parent: PageId, max_size: usize, key_size: usize) -> Self {
        init_header(data.as_mut(), INTERNAL_TAG, page_id, parent, max_size, key_size);
        Self { data, key_size }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    fn set_size(&mut self, size: usize) {
        write_u32(self.bytes_mut(), SIZE_OFFSET, size as u32);
    }

    pub fn set_parent_page_id(&mut self, parent: PageId) {
        set_parent_page_id(self.bytes_mut(), parent);
    }

    pub fn set_key_at(&mut self, index: usize, key: &[u8]) {
        let offset = self.entry_offset(index);
        let key_size = self.key_size;
        self.bytes_mut()[offset..offset + key_size].copy_from_slice(key);
    }

    fn set_child_at(&mut self, index: usize, child: PageId) {
        let offset = self.entry_offset(index) + self.key_size;
        write_u32(self.bytes_mut(), offset, child.as_u32());
    }

    /// Fills a fresh root with two children split by `key`.
    pub fn populate_new_root(&mut self, left: PageId, key: &[u8], right: PageId) {
        self.set_child_at(0, left);
        self.set_key_at(1, key);
        self.set_child_at(1, right);
        self.set_size(2);
    }

    /// Inserts an entry at `index`, shifting later entries right.
    pub fn insert_at(&mut self, index: usize, key: &[u8], child: PageId) {
        let size = self.size();
        debug_assert!(index <= size);
        let start = self.entry_offset(index);
        let end = self.entry_offset(size);
        let entry_size = self.entry_size();
        self.bytes_mut().copy_within(start..end, start + entry_size);
        self.set_key_at(index, key);
        self.set_child_at(index, child);
        self.set_size(size + 1);
    }

    /// Removes the entry at `index`, shifting later entries left.
    pub fn remove_at(&mut self, index: usize) {
        let size = self.size();
        debug_assert!(index < size);
        let start = self.entry_offset(index + 1);
        let end = self.entry_offset(size);
        let dest = self.entry_offset(index);
        self.bytes_mut().copy_within(start..end, dest);
        self.set_size(size - 1);
    }

    fn append_from<C: AsRef<[u8]>>(&mut self, source: &InternalPage<C>, from: usize, count: usize) {
        let size = self.size();
        let src = source.entry_offset(from);
        let len = count * self.entry_size();
        let dest = self.entry_offset(size);
        self.bytes_mut()[dest..dest + len].copy_from_slice(&source.bytes()[src..src + len]);
        self.set_size(size + count);
    }

    fn children(&self, from: usize, to: usize) -> Vec<PageId> {
        (from..to).map(|i| self.child_at(i)).collect()
    }

    /// Split: keeps the lower `min_size` children and moves the rest into
    /// the empty `recipient`. The recipient's placeholder key becomes the
    /// separator to push up. Returns the children that moved.
    pub fn move_upper_half_to<C: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut InternalPage<C>,
    ) -> Vec<PageId> {
        let size = self.size();
        let keep = self.min_size();
        recipient.append_from(self, keep, size - keep);
        self.set_size(keep);
        recipient.children(0, size - keep)
    }

    /// Merge: appends every child to `recipient`, the left sibling, pulling
    /// `middle_key` down from the parent as the key of the first one.
    /// Returns the children that moved.
    pub fn move_all_to<C: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut InternalPage<C>,
        middle_key: &[u8],
    ) -> Vec<PageId> {
        let size = self.size();
        let start = recipient.size();
        self.set_key_at(0, middle_key);
        recipient.append_from(self, 0, size);
        self.set_size(0);
        recipient.children(start, start + size)
    }

    /// Moves the first child to the end of `recipient`, the left sibling,
    /// keyed by `middle_key`. Afterwards `key_at(0)` holds the new separator.
    pub fn move_first_to_end_of<C: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut InternalPage<C>,
        middle_key: &[u8],
    ) -> PageId {
        let child = self.child_at(0);
        recipient.insert_at(recipient.size(), middle_key, child);
        self.remove_at(0);
        child
    }

    /// Moves the last child to the front of `recipient`, the right sibling,
    /// whose old first child gets `middle_key`. Afterwards the recipient's
    /// `key_at(0)` holds the new separator.
    pub fn move_last_to_front_of<C: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut InternalPage<C>,
        middle_key: &[u8],
    ) -> PageId {
        let last = self.size() - 1;
        let child = self.child_at(last);
        recipient.set_key_at(0, middle_key);
        recipient.insert_at(0, self.key_at(last), child);
        self.set_size(last);
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SlotId;
    use crate::index::IntegerComparator;

    fn key(v: i64) -> Vec<u8> {
        IntegerComparator::encode(v, 4)
    }

    fn rid(v: u32) -> RowId {
        RowId::new(PageId::new(v), SlotId::new(v as u16))
    }

    fn leaf_with(buf: &mut [u8], page_id: u32, keys: &[i64], max_size: usize) {
        let mut leaf = LeafPage::init(buf, PageId::new(page_id), INVALID_PAGE_ID, max_size, 4);
        for (i, &k) in keys.iter().enumerate() {
            leaf.insert_at(i, &key(k), rid(k as u32));
        }
    }

    fn keys_of<B: AsRef<[u8]>>(leaf: &LeafPage<B>) -> Vec<i64> {
        (0..leaf.size())
            .map(|i| IntegerComparator::decode(leaf.key_at(i)))
            .collect()
    }

    #[test]
    fn test_capacity() {
        assert_eq!(leaf_capacity(4), (PAGE_SIZE - LEAF_HEADER_SIZE) / 10 - 1);
        assert_eq!(internal_capacity(4), (PAGE_SIZE - INTERNAL_HEADER_SIZE) / 8 - 1);
        assert_eq!(min_size(4), 2);
        assert_eq!(min_size(5), 3);
    }

    #[test]
    fn test_node_type_discriminant() {
        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(NodeType::of(&buf).is_err());
        assert!(LeafPage::new(&buf[..]).is_err());

        InternalPage::init(&mut buf[..], PageId::new(3), INVALID_PAGE_ID, 8, 4);
        assert_eq!(NodeType::of(&buf).unwrap(), NodeType::Internal);
        let err = LeafPage::new(&buf[..]).err().unwrap();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_leaf_insert_search_remove() {
        let mut buf = vec![0u8; PAGE_SIZE];
        leaf_with(&mut buf, 1, &[10, 20, 30], 8);

        let mut leaf = LeafPage::new(&mut buf[..]).unwrap();
        let cmp = IntegerComparator;
        assert_eq!(leaf.search(&key(20), &cmp), Ok(1));
        assert_eq!(leaf.search(&key(25), &cmp), Err(2));
        assert_eq!(leaf.search(&key(5), &cmp), Err(0));

        leaf.insert_at(2, &key(25), rid(25));
        assert_eq!(keys_of(&leaf), vec![10, 20, 25, 30]);
        assert_eq!(leaf.value_at(2), rid(25));

        leaf.remove_at(0);
        assert_eq!(keys_of(&leaf), vec![20, 25, 30]);
        assert_eq!(leaf.value_at(0), rid(20));
    }

    #[test]
    fn test_leaf_split_keeps_lower_half() {
        let mut left_buf = vec![0u8; PAGE_SIZE];
        let mut right_buf = vec![0u8; PAGE_SIZE];
        leaf_with(&mut left_buf, 1, &[1, 2, 3, 4, 5], 4);

        let mut left = LeafPage::new(&mut left_buf[..]).unwrap();
        left.set_next_page_id(PageId::new(9));
        let mut right = LeafPage::init(&mut right_buf[..], PageId::new(2), INVALID_PAGE_ID, 4, 4);
        left.move_upper_half_to(&mut right);

        assert_eq!(keys_of(&left), vec![1, 2]);
        assert_eq!(keys_of(&right), vec![3, 4, 5]);
        assert_eq!(left.next_page_id(), PageId::new(2));
        assert_eq!(right.next_page_id(), PageId::new(9));
    }

    #[test]
    fn test_leaf_redistribute_and_merge() {
        let mut left_buf = vec![0u8; PAGE_SIZE];
        let mut right_buf = vec![0u8; PAGE_SIZE];
        leaf_with(&mut left_buf, 1, &[1, 2, 3], 4);
        leaf_with(&mut right_buf, 2, &[7], 4);

        let mut left = LeafPage::new(&mut left_buf[..]).unwrap();
        let mut right = LeafPage::new(&mut right_buf[..]).unwrap();

        left.move_last_to_front_of(&mut right);
        assert_eq!(keys_of(&left), vec![1, 2]);
        assert_eq!(keys_of(&right), vec![3, 7]);

        right.move_first_to_end_of(&mut left);
        assert_eq!(keys_of(&left), vec![1, 2, 3]);
        assert_eq!(keys_of(&right), vec![7]);

        right.move_all_to(&mut left);
        assert_eq!(keys_of(&left), vec![1, 2, 3, 7]);
        assert_eq!(right.size(), 0);
    }

    #[test]
    fn test_internal_lookup() {
        let mut buf = vec![0u8; PAGE_SIZE];
        let mut node = InternalPage::init(&mut buf[..], PageId::new(1), INVALID_PAGE_ID, 8, 4);
        node.populate_new_root(PageId::new(10), &key(100), PageId::new(11));
        node.insert_at(2, &key(200), PageId::new(12));

        let cmp = IntegerComparator;
        assert_eq!(node.lookup(&key(5), &cmp), 0);
        assert_eq!(node.lookup(&key(100), &cmp), 1);
        assert_eq!(node.lookup(&key(150), &cmp), 1);
        assert_eq!(node.lookup(&key(200), &cmp), 2);
        assert_eq!(node.lookup(&key(999), &cmp), 2);
        assert_eq!(node.child_index(PageId::new(12)), Some(2));
        assert_eq!(node.child_index(PageId::new(13)), None);
    }

    #[test]
    fn test_internal_split_pushes_up_first_key() {
        let mut left_buf = vec![0u8; PAGE_SIZE];
        let mut right_buf = vec![0u8; PAGE_SIZE];
        let mut left = InternalPage::init(&mut left_buf[..], PageId::new(1), INVALID_PAGE_ID, 3, 4);
        left.populate_new_root(PageId::new(10), &key(10), PageId::new(11));
        left.insert_at(2, &key(20), PageId::new(12));
        left.insert_at(3, &key(30), PageId::new(13));

        let mut right = InternalPage::init(&mut right_buf[..], PageId::new(2), INVALID_PAGE_ID, 3, 4);
        let moved = left.move_upper_half_to(&mut right);

        assert_eq!(left.size(), 2);
        assert_eq!(right.size(), 2);
        assert_eq!(moved, vec![PageId::new(12), PageId::new(13)]);
        assert_eq!(IntegerComparator::decode(right.key_at(0)), 20);
        assert_eq!(IntegerComparator::decode(right.key_at(1)), 30);
    }

    #[test]
    fn test_internal_merge_pulls_down_separator() {
        let mut left_buf = vec![0u8; PAGE_SIZE];
        let mut right_buf = vec![0u8; PAGE_SIZE];
        let mut left = InternalPage::init(&mut left_buf[..], PageId::new(1), INVALID_PAGE_ID, 4, 4);
        left.populate_new_root(PageId::new(10), &key(10), PageId::new(11));
        let mut right = InternalPage::init(&mut right_buf[..], PageId::new(2), INVALID_PAGE_ID, 4, 4);
        right.populate_new_root(PageId::new(12), &key(30), PageId::new(13));

        let moved = right.move_all_to(&mut left, &key(20));
        assert_eq!(moved, vec![PageId::new(12), PageId::new(13)]);
        assert_eq!(left.size(), 4);
        let keys: Vec<i64> = (1..4).map(|i| IntegerComparator::decode(left.key_at(i))).collect();
        assert_eq!(keys, vec![10, 20, 30]);
        assert_eq!(left.child_at(2), PageId::new(12));
    }

    #[test]
    fn test_internal_borrow_rotates_separator() {
        let mut left_buf = vec![0u8; PAGE_SIZE];
        let mut right_buf = vec![0u8; PAGE_SIZE];
        let mut left = InternalPage::init(&mut left_buf[..], PageId::new(1), INVALID_PAGE_ID, 4, 4);
        left.populate_new_root(PageId::new(10), &key(10), PageId::new(11));
        left.insert_at(2, &key(20), PageId::new(12));
        let mut right = InternalPage::init(&mut right_buf[..], PageId::new(2), INVALID_PAGE_ID, 4, 4);
        right.populate_new_root(PageId::new(13), &key(40), PageId::new(14));

        // Parent separator between the two is 30.
        let moved = left.move_last_to_front_of(&mut right, &key(30));
        assert_eq!(moved, PageId::new(12));
        assert_eq!(IntegerComparator::decode(right.key_at(0)), 20);
        assert_eq!(IntegerComparator::decode(right.key_at(1)), 30);
        assert_eq!(right.child_at(1), PageId::new(13));

        let moved = right.move_first_to_end_of(&mut left, &key(20));
        assert_eq!(moved, PageId::new(12));
        assert_eq!(left.size(), 3);
        assert_eq!(IntegerComparator::decode(right.key_at(0)), 30);
    }
}
