//! Tree Node Data Structures
//!
//! [`TreeNode`] is the row-level entity of a materialized-path tree table. It
//! tracks its persisted parent so a pending move can be told apart from a no-op
//! reassignment, and it owns its [`Path`], which only the tree service assigns.
//!
//! # Examples
//!
//! ```rust
//! use pathtree_core::models::{NodeKey, NodeState, TreeNode};
//! use serde_json::json;
//!
//! let root = TreeNode::new(json!({"name": "Electronics"})).with_key(NodeKey::from("1"));
//! let child = TreeNode::new(json!({"name": "Phones"}))
//!     .with_key(NodeKey::from("2"))
//!     .with_parent(&root);
//!
//! assert!(root.is_root());
//! assert_eq!(child.parent_key(), Some(&NodeKey::from("1")));
//! assert_eq!(child.state(), NodeState::PathPending);
//! ```

use crate::models::path::Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Primary key of a tree node.
///
/// Integer keys come from backend auto-increment columns; text keys are
/// client-generated (UUIDs) or natural keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeKey {
    Integer(i64),
    Text(String),
}

impl NodeKey {
    /// Generate a random UUID v4 key.
    pub fn generate() -> Self {
        NodeKey::Text(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Integer(value) => write!(f, "{}", value),
            NodeKey::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for NodeKey {
    fn from(value: i64) -> Self {
        NodeKey::Integer(value)
    }
}

impl From<&str> for NodeKey {
    fn from(value: &str) -> Self {
        NodeKey::Text(value.to_string())
    }
}

impl From<String> for NodeKey {
    fn from(value: String) -> Self {
        NodeKey::Text(value)
    }
}

impl From<Uuid> for NodeKey {
    fn from(value: Uuid) -> Self {
        NodeKey::Text(value.to_string())
    }
}

/// Lifecycle state of a node relative to persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Not persisted and no path source value known yet
    Unpersisted,
    /// Path source value known but no path assigned
    PathPending,
    /// Persisted with a path
    PathAssigned,
    /// Parent reference changed but not yet saved
    Moving,
    /// Last save was aborted because of a circular reference
    Rejected,
}

/// Capability interface shared by everything that behaves like a tree node.
///
/// Query builders and [`NodeCollection`](crate::models::NodeCollection) operate
/// over this trait rather than a concrete entity type.
pub trait TreeEntity: Clone {
    fn key(&self) -> Option<&NodeKey>;

    fn parent_key(&self) -> Option<&NodeKey>;

    fn path(&self) -> Option<&Path>;

    /// Value used as this node's own (last) path segment.
    fn path_source(&self) -> Option<String>;

    /// Replace the loaded `children` relation.
    fn set_children(&mut self, children: Vec<Self>);

    fn depth(&self) -> Option<usize> {
        self.path().map(Path::depth)
    }

    fn is_root(&self) -> bool {
        self.parent_key().is_none()
    }
}

/// Column values of a persisted row, used by storage backends to rebuild a node.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub key: NodeKey,
    pub parent_key: Option<NodeKey>,
    pub source: Option<String>,
    pub path: Option<Path>,
    pub properties: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// A record of a materialized-path tree table.
///
/// # Fields
///
/// - `key`: primary key, `None` until assigned (client side or by the backend)
/// - `source`: value of a custom path source column; when absent the key is used
/// - `properties`: free-form JSON payload
///
/// The parent reference, path and persistence bookkeeping are private: parents
/// change through [`associate`](Self::associate)/[`disassociate`](Self::disassociate),
/// paths only through the tree service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub key: Option<NodeKey>,

    parent_key: Option<NodeKey>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source: Option<String>,

    path: Option<Path>,

    pub properties: serde_json::Value,

    pub created_at: Option<DateTime<Utc>>,

    pub modified_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    children: Option<Vec<TreeNode>>,

    /// Parent reference as last persisted
    #[serde(skip)]
    original_parent_key: Option<NodeKey>,

    #[serde(skip)]
    persisted: bool,

    #[serde(skip)]
    moved: bool,

    #[serde(skip)]
    rejected: bool,

    /// Set when associated with a parent that has no key yet
    #[serde(skip)]
    unsaved_parent: bool,
}

impl TreeNode {
    /// Create an unsaved root node carrying `properties`.
    pub fn new(properties: serde_json::Value) -> Self {
        Self {
            key: None,
            parent_key: None,
            source: None,
            path: None,
            properties,
            created_at: None,
            modified_at: None,
            children: None,
            original_parent_key: None,
            persisted: false,
            moved: false,
            rejected: false,
            unsaved_parent: false,
        }
    }

    /// Rebuild a persisted node from its stored columns.
    pub fn from_stored(stored: StoredNode) -> Self {
        Self {
            key: Some(stored.key),
            original_parent_key: stored.parent_key.clone(),
            parent_key: stored.parent_key,
            source: stored.source,
            path: stored.path,
            properties: stored.properties,
            created_at: stored.created_at,
            modified_at: stored.modified_at,
            children: None,
            persisted: true,
            moved: false,
            rejected: false,
            unsaved_parent: false,
        }
    }

    pub fn with_key(mut self, key: impl Into<NodeKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_parent(mut self, parent: &TreeNode) -> Self {
        self.associate(parent);
        self
    }

    pub fn with_parent_key(mut self, parent_key: Option<NodeKey>) -> Self {
        self.set_parent_key(parent_key);
        self
    }

    pub fn parent_key(&self) -> Option<&NodeKey> {
        self.parent_key.as_ref()
    }

    /// Parent reference as it was last persisted.
    pub fn original_parent_key(&self) -> Option<&NodeKey> {
        self.original_parent_key.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    pub fn has_path(&self) -> bool {
        self.path.is_some()
    }

    pub fn depth(&self) -> Option<usize> {
        self.path.as_ref().map(Path::depth)
    }

    /// Point this node at a new parent. Takes effect on the next save.
    ///
    /// A parent without a key leaves this node unattached and flags it; the
    /// tree service refuses to create or save it until the parent is set again.
    pub fn associate(&mut self, parent: &TreeNode) {
        self.set_parent_key(parent.key.clone());
        self.unsaved_parent = parent.key.is_none();
    }

    /// Detach this node from its parent, making it a root on the next save.
    pub fn disassociate(&mut self) {
        self.set_parent_key(None);
    }

    pub fn set_parent_key(&mut self, parent_key: Option<NodeKey>) {
        self.parent_key = parent_key;
        self.rejected = false;
        self.unsaved_parent = false;
    }

    /// Whether the last associated parent had not been created yet.
    pub fn has_unsaved_parent(&self) -> bool {
        self.unsaved_parent
    }

    pub fn is_root(&self) -> bool {
        self.parent_key.is_none()
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Whether the parent reference differs from the persisted one.
    ///
    /// Reassigning the current parent is not a move.
    pub fn is_moving(&self) -> bool {
        self.persisted && self.parent_key != self.original_parent_key
    }

    /// Whether the last successful save changed the parent.
    pub fn was_moved(&self) -> bool {
        self.moved
    }

    /// The path source value: the custom source column when set, else the key.
    pub fn path_source(&self) -> Option<String> {
        self.source
            .clone()
            .or_else(|| self.key.as_ref().map(ToString::to_string))
    }

    pub fn state(&self) -> NodeState {
        if self.rejected {
            NodeState::Rejected
        } else if !self.persisted {
            if self.path.is_none() && self.path_source().is_some() {
                NodeState::PathPending
            } else {
                NodeState::Unpersisted
            }
        } else if self.path.is_none() {
            NodeState::PathPending
        } else if self.is_moving() {
            NodeState::Moving
        } else {
            NodeState::PathAssigned
        }
    }

    /// Whether this node is a strict ancestor of `other`, judged by `other`'s path.
    pub fn is_ancestor_of(&self, other: &TreeNode) -> bool {
        match (self.path_source(), other.path.as_ref()) {
            (Some(source), Some(path)) => path.contains_source(&source) && !self.is_same(other),
            _ => false,
        }
    }

    pub fn is_descendant_of(&self, other: &TreeNode) -> bool {
        other.is_ancestor_of(self)
    }

    /// Whether both values refer to the same persisted row.
    pub fn is_same(&self, other: &TreeNode) -> bool {
        self.key.is_some() && self.key == other.key
    }

    /// Loaded `children` relation, `None` when never linked.
    pub fn children(&self) -> Option<&[TreeNode]> {
        self.children.as_deref()
    }

    pub fn set_children(&mut self, children: Vec<TreeNode>) {
        self.children = Some(children);
    }

    pub(crate) fn assign_path(&mut self, path: Path) {
        self.path = Some(path);
    }

    /// Record a successful insert.
    pub(crate) fn mark_created(&mut self, key: NodeKey, now: DateTime<Utc>) {
        self.key = Some(key);
        self.original_parent_key = self.parent_key.clone();
        self.persisted = true;
        self.moved = false;
        self.rejected = false;
        self.created_at = Some(now);
        self.modified_at = Some(now);
    }

    /// Record a successful update; `moved` reports whether the parent changed.
    pub(crate) fn mark_saved(&mut self, moved: bool, now: DateTime<Utc>) {
        self.original_parent_key = self.parent_key.clone();
        self.moved = moved;
        self.rejected = false;
        self.modified_at = Some(now);
    }

    /// Roll the parent back to its persisted value after an aborted move.
    pub(crate) fn mark_rejected(&mut self) {
        self.parent_key = self.original_parent_key.clone();
        self.rejected = true;
    }
}

impl TreeEntity for TreeNode {
    fn key(&self) -> Option<&NodeKey> {
        self.key.as_ref()
    }

    fn parent_key(&self) -> Option<&NodeKey> {
        TreeNode::parent_key(self)
    }

    fn path(&self) -> Option<&Path> {
        TreeNode::path(self)
    }

    fn path_source(&self) -> Option<String> {
        TreeNode::path_source(self)
    }

    fn set_children(&mut self, children: Vec<Self>) {
        TreeNode::set_children(self, children);
    }
}
