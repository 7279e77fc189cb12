//! Data Models
//!
//! This module contains the core data structures of a materialized-path tree:
//!
//! - `Path` - Immutable dot-separated path value and its segment arithmetic
//! - `SegmentTransformer` - Per-segment encoding applied to stored paths
//! - `TreeNode` - Row-level tree entity with parent tracking
//! - `NodeCollection` - In-memory assembly of flat result sets into trees
//!
//! Paths are stored in a single text column of the tree table; everything a
//! node knows about its ancestry is derived from that column.

mod node_collection;
mod path;
mod segment;
mod tree_node;

pub use node_collection::NodeCollection;
pub use path::{Path, PathError, PathPart, SEPARATOR};
pub use segment::{
    identity_transformer, IdentityTransformer, SegmentEncoding, SegmentTransformer,
    TransformerChain, UuidLabelTransformer,
};
pub use tree_node::{NodeKey, NodeState, StoredNode, TreeEntity, TreeNode};
