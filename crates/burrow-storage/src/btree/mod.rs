//! B+-tree index over a paged file.
//!
//! The tree maps fixed-width integer keys to record ids. Payloads live only
//! in the leaves, which are chained left-to-right in key order for range
//! scans. Inner pages hold separator keys with one more child pointer than
//! keys.
//!
//! On disk the index file is laid out as:
//! ```text
//! page 0: reserved
//! page 1: IndexMeta (relation, attribute, root, height, geometry)
//! page 2+: tree nodes, allocated on demand by splits
//! ```
//!
//! A node page does not record whether it is a leaf: the reader derives that
//! from its depth relative to the tree height stored in the metadata.

pub mod index;
pub mod meta;
pub mod node;
pub mod scan;

pub use index::{BTreeIndex, IndexConfig};
pub use meta::{IndexMeta, MAX_RELATION_NAME, META_PAGE_NO};
pub use node::{max_leaf_occupancy, max_node_occupancy, InternalNode, LeafNode};
pub use scan::Operator;
