pub mod btree_index;
pub mod btree_iterator;
pub mod btree_page;
pub mod key_comparator;
pub mod roots_page;

pub use btree_index::BTreeIndex;
pub use btree_iterator::BTreeIterator;
pub use btree_page::{InternalPage, LeafPage, NodeType};
pub use key_comparator::{BytewiseComparator, IntegerComparator, KeyComparator};
pub use roots_page::{IndexRootsPage, MAX_INDEX_ROOTS};
