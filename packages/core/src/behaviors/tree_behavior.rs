use crate::config::{KeyStrategy, PathSource, TreeConfig};
use crate::db::PathCodec;
use crate::models::{Path, PathError, PathPart, TreeNode};
use std::fmt;
use tracing::warn;

/// When a new node's path can be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathAssignment {
    /// The path source value is known before insert (custom source column or
    /// client-generated key); the path is written with the row.
    BeforeInsert,
    /// The backend generates the key that the path is built from; the path is
    /// written afterwards with a quiet update.
    AfterInsert,
}

pub fn path_assignment(config: &TreeConfig) -> PathAssignment {
    match (&config.path_source, config.key_strategy) {
        (PathSource::Column(_), _) => PathAssignment::BeforeInsert,
        (PathSource::Key, KeyStrategy::Uuid) => PathAssignment::BeforeInsert,
        (PathSource::Key, KeyStrategy::AutoIncrement) => PathAssignment::AfterInsert,
    }
}

/// A node's path: its parent's path followed by its own source value.
pub fn build_path(
    codec: &PathCodec,
    parent_path: Option<&Path>,
    source: &str,
) -> Result<Path, PathError> {
    match parent_path {
        Some(parent) => codec.path_from_parts([PathPart::Path(parent), PathPart::Raw(source)]),
        None => codec.path_from_parts([PathPart::Raw(source)]),
    }
}

/// Whether attaching a node with path source `source` below `parent_path`
/// would make the node its own ancestor.
pub fn has_circular_reference(parent_path: &Path, source: &str) -> bool {
    parent_path.contains_source(source)
}

/// Lifecycle hooks consulted by the tree service.
pub trait TreeBehavior: Send + Sync + fmt::Debug {
    /// Whether the service should compute a path for a node being created.
    fn should_assign_path(&self, node: &TreeNode) -> bool {
        !node.has_path()
    }

    /// Whether a save must check the new parent chain for the node itself.
    ///
    /// Only actual parent changes to a non-null parent can introduce a cycle.
    fn should_detect_circular_reference(&self, node: &TreeNode) -> bool {
        node.is_moving() && node.parent_key().is_some()
    }

    /// Whether a save must rewrite the paths of the node's subtree.
    fn should_rebuild_subtree(&self, node: &TreeNode) -> bool {
        node.is_moving()
    }

    /// Called before a move is rejected.
    fn on_circular_reference(&self, node: &TreeNode, parent_path: &Path) {
        warn!(
            key = ?node.key,
            parent_path = %parent_path,
            "Rejected move: new parent is a descendant of the node"
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTreeBehavior;

impl TreeBehavior for DefaultTreeBehavior {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NodeKey, SegmentEncoding, StoredNode};
    use serde_json::json;

    fn persisted(key: &str, parent: Option<&str>, path: &str) -> TreeNode {
        TreeNode::from_stored(StoredNode {
            key: NodeKey::from(key),
            parent_key: parent.map(NodeKey::from),
            source: None,
            path: Some(Path::parse(path).unwrap()),
            properties: json!({}),
            created_at: None,
            modified_at: None,
        })
    }

    #[test]
    fn test_path_assignment_depends_on_source_availability() {
        let config = TreeConfig::new("nodes");
        assert_eq!(path_assignment(&config), PathAssignment::AfterInsert);

        let uuid = config.clone().with_key_strategy(KeyStrategy::Uuid);
        assert_eq!(path_assignment(&uuid), PathAssignment::BeforeInsert);

        let slug = config.with_path_source(PathSource::Column("slug".into()));
        assert_eq!(path_assignment(&slug), PathAssignment::BeforeInsert);
    }

    #[test]
    fn test_build_path_for_root_and_child() {
        let codec = PathCodec::new("path", SegmentEncoding::UuidLabel.transformer());

        let root = build_path(&codec, None, "a-1").unwrap();
        assert_eq!(root.as_str(), "a_1");

        let child = build_path(&codec, Some(&root), "b-2").unwrap();
        assert_eq!(child.as_str(), "a_1.b_2");
        assert_eq!(child.segments(), vec!["a-1", "b-2"]);
    }

    #[test]
    fn test_circular_reference_detection() {
        let descendant_path = Path::parse("1.2.3").unwrap();

        assert!(has_circular_reference(&descendant_path, "2"));
        assert!(has_circular_reference(&descendant_path, "3"));
        assert!(!has_circular_reference(&descendant_path, "4"));
        // segment match, not substring match
        assert!(!has_circular_reference(&Path::parse("12.3").unwrap(), "2"));
    }

    #[test]
    fn test_default_hooks_follow_parent_changes() {
        let behavior = DefaultTreeBehavior;
        let mut node = persisted("2", Some("1"), "1.2");

        assert!(!behavior.should_detect_circular_reference(&node));
        assert!(!behavior.should_rebuild_subtree(&node));
        assert!(!behavior.should_assign_path(&node));

        node.set_parent_key(Some(NodeKey::from("5")));
        assert!(behavior.should_detect_circular_reference(&node));
        assert!(behavior.should_rebuild_subtree(&node));

        node.disassociate();
        assert!(!behavior.should_detect_circular_reference(&node));
        assert!(behavior.should_rebuild_subtree(&node));
    }
}
