//! Tests for TreeService write paths
//!
//! Tests cover:
//! - Path assignment on create (after insert and before insert)
//! - Key strategy and path source validation
//! - Moves, no-op reassignment and rejected moves
//! - Transaction rollback on failure

#[cfg(test)]
mod tests {
    use crate::config::{KeyStrategy, PathSource, TreeConfig};
    use crate::db::{DatabaseService, LibsqlTreeStore, TreeStore};
    use crate::models::{NodeKey, NodeState, TreeNode};
    use crate::services::{TreeService, TreeServiceError};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Returns (service, _temp_dir) - temp_dir must be kept alive for test duration
    async fn create_test_service(config: TreeConfig) -> (TreeService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let db = Arc::new(DatabaseService::new(db_path).await.unwrap());
        let store = Arc::new(LibsqlTreeStore::new(db, config).unwrap());
        store.ensure_schema().await.unwrap();

        (TreeService::new(store), temp_dir)
    }

    async fn create(service: &TreeService, parent: Option<&TreeNode>) -> TreeNode {
        let mut node = TreeNode::new(json!({}));
        if let Some(parent) = parent {
            node.associate(parent);
        }
        service.create(node).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_path_after_insert() {
        let (service, _temp) = create_test_service(TreeConfig::new("nodes")).await;

        let root = create(&service, None).await;
        let child = create(&service, Some(&root)).await;

        assert_eq!(root.key, Some(NodeKey::Integer(1)));
        assert_eq!(root.path().unwrap().as_str(), "1");
        assert_eq!(child.path().unwrap().as_str(), "1.2");
        assert_eq!(child.depth(), Some(2));
        assert_eq!(child.state(), NodeState::PathAssigned);

        // the stored row matches the in-memory path
        let stored = service.get(child.key.as_ref().unwrap()).await.unwrap();
        assert_eq!(stored.path(), child.path());
        assert_eq!(stored.parent_key(), root.key.as_ref());
    }

    #[tokio::test]
    async fn test_create_with_uuid_keys_assigns_path_before_insert() {
        let config = TreeConfig::new("nodes").with_key_strategy(KeyStrategy::Uuid);
        let (service, _temp) = create_test_service(config).await;

        let root = create(&service, None).await;
        let child = create(&service, Some(&root)).await;

        let root_key = root.key.clone().unwrap().to_string();
        let child_key = child.key.clone().unwrap().to_string();
        assert_eq!(
            child.path().unwrap().segments(),
            vec![root_key, child_key]
        );
    }

    #[tokio::test]
    async fn test_create_rejects_missing_parent() {
        let (service, _temp) = create_test_service(TreeConfig::new("nodes")).await;

        let orphan = TreeNode::new(json!({})).with_parent_key(Some(NodeKey::from(42i64)));
        let result = service.create(orphan).await;

        assert!(matches!(
            result,
            Err(TreeServiceError::InvalidParent { .. })
        ));
        assert!(service.roots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_parent_without_key() {
        let (service, _temp) = create_test_service(TreeConfig::new("nodes")).await;

        let draft_parent = TreeNode::new(json!({}));
        let child = TreeNode::new(json!({})).with_parent(&draft_parent);
        assert!(child.has_unsaved_parent());

        let result = service.create(child.clone()).await;
        assert!(matches!(
            result,
            Err(TreeServiceError::ValidationFailed(_))
        ));
        assert!(service.roots().await.unwrap().is_empty());

        let parent = service.create(draft_parent).await.unwrap();
        let child = service
            .create(child.with_parent(&parent))
            .await
            .unwrap();
        assert_eq!(child.parent_key(), parent.key.as_ref());
        assert_eq!(child.path().unwrap().as_str(), "1.2");
    }

    #[tokio::test]
    async fn test_save_rejects_parent_without_key() {
        let (service, _temp) = create_test_service(TreeConfig::new("nodes")).await;

        let root = create(&service, None).await;
        let mut child = create(&service, Some(&root)).await;

        child.associate(&TreeNode::new(json!({})));
        assert!(matches!(
            service.save(&mut child).await,
            Err(TreeServiceError::ValidationFailed(_))
        ));

        let stored = service.get(child.key.as_ref().unwrap()).await.unwrap();
        assert_eq!(stored.parent_key(), root.key.as_ref());
        assert_eq!(stored.path().unwrap().as_str(), "1.2");
    }

    #[tokio::test]
    async fn test_create_validates_keys_and_sources() {
        let (service, _temp) = create_test_service(TreeConfig::new("nodes")).await;

        let text_key = TreeNode::new(json!({})).with_key("abc");
        assert!(matches!(
            service.create(text_key).await,
            Err(TreeServiceError::ValidationFailed(_))
        ));

        let with_source = TreeNode::new(json!({})).with_source("books");
        assert!(matches!(
            service.create(with_source).await,
            Err(TreeServiceError::ValidationFailed(_))
        ));

        let config =
            TreeConfig::new("categories").with_path_source(PathSource::Column("slug".into()));
        let (slug_service, _temp) = create_test_service(config).await;
        assert!(matches!(
            slug_service.create(TreeNode::new(json!({}))).await,
            Err(TreeServiceError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_separator_in_source() {
        let config =
            TreeConfig::new("categories").with_path_source(PathSource::Column("slug".into()));
        let (service, _temp) = create_test_service(config).await;

        let result = service
            .create(TreeNode::new(json!({})).with_source("a.b"))
            .await;

        assert!(matches!(result, Err(TreeServiceError::InvalidPath(_))));
        assert!(service.roots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_requires_created_node() {
        let (service, _temp) = create_test_service(TreeConfig::new("nodes")).await;

        let mut node = TreeNode::new(json!({}));
        assert!(matches!(
            service.save(&mut node).await,
            Err(TreeServiceError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_save_without_move_keeps_path() {
        let (service, _temp) = create_test_service(TreeConfig::new("nodes")).await;

        let root = create(&service, None).await;
        let mut child = create(&service, Some(&root)).await;

        child.properties = json!({"title": "renamed"});
        service.save(&mut child).await.unwrap();

        assert!(!child.was_moved());
        assert_eq!(child.path().unwrap().as_str(), "1.2");

        let stored = service.get(child.key.as_ref().unwrap()).await.unwrap();
        assert_eq!(stored.properties, json!({"title": "renamed"}));
        assert_eq!(stored.path().unwrap().as_str(), "1.2");
    }

    #[tokio::test]
    async fn test_reassigning_current_parent_is_not_a_move() {
        let (service, _temp) = create_test_service(TreeConfig::new("nodes")).await;

        let root = create(&service, None).await;
        let mut child = create(&service, Some(&root)).await;

        child.associate(&root);
        assert!(!child.is_moving());
        service.save(&mut child).await.unwrap();

        assert!(!child.was_moved());
        assert_eq!(child.path().unwrap().as_str(), "1.2");
    }

    #[tokio::test]
    async fn test_move_below_self_is_rejected() {
        let (service, _temp) = create_test_service(TreeConfig::new("nodes")).await;

        let mut root = create(&service, None).await;
        let child = create(&service, Some(&root)).await;

        root.associate(&child);
        let result = service.save(&mut root).await;

        assert!(matches!(
            result,
            Err(TreeServiceError::CircularReference { .. })
        ));
        assert_eq!(root.state(), NodeState::Rejected);
        assert_eq!(root.parent_key(), None);

        // nothing was written
        let stored = service.get(root.key.as_ref().unwrap()).await.unwrap();
        assert_eq!(stored.parent_key(), None);
        assert_eq!(stored.path().unwrap().as_str(), "1");
    }

    #[tokio::test]
    async fn test_move_onto_itself_is_rejected() {
        let (service, _temp) = create_test_service(TreeConfig::new("nodes")).await;

        let mut node = create(&service, None).await;
        let own_key = node.key.clone();
        node.set_parent_key(own_key);

        let result = service.save(&mut node).await;
        assert!(result.unwrap_err().is_circular_reference());
    }

    #[tokio::test]
    async fn test_move_to_missing_parent_rolls_back() {
        let (service, _temp) = create_test_service(TreeConfig::new("nodes")).await;

        let root = create(&service, None).await;
        let mut child = create(&service, Some(&root)).await;

        child.set_parent_key(Some(NodeKey::from(99i64)));
        let result = service.save(&mut child).await;

        assert!(matches!(
            result,
            Err(TreeServiceError::InvalidParent { .. })
        ));
        // a non-cycle failure leaves the pending move in place
        assert!(child.is_moving());

        let stored = service.get(child.key.as_ref().unwrap()).await.unwrap();
        assert_eq!(stored.parent_key(), root.key.as_ref());
    }

    #[tokio::test]
    async fn test_source_change_is_rejected() {
        let config =
            TreeConfig::new("categories").with_path_source(PathSource::Column("slug".into()));
        let (service, _temp) = create_test_service(config).await;

        let mut node = service
            .create(TreeNode::new(json!({})).with_source("books"))
            .await
            .unwrap();
        node.source = Some("novels".to_string());

        assert!(matches!(
            service.save(&mut node).await,
            Err(TreeServiceError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_descendants() {
        let (service, _temp) = create_test_service(TreeConfig::new("nodes")).await;

        let root = create(&service, None).await;
        let child = create(&service, Some(&root)).await;
        let grandchild = create(&service, Some(&child)).await;

        let deleted = service.delete(child.key.as_ref().unwrap()).await.unwrap();
        assert_eq!(deleted, 1);

        assert!(service
            .find(grandchild.key.as_ref().unwrap())
            .await
            .unwrap()
            .is_none());
        assert!(service.descendants(&root).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_children_are_ordered_by_key() {
        let (service, _temp) = create_test_service(TreeConfig::new("nodes")).await;

        let root = create(&service, None).await;
        let first = create(&service, Some(&root)).await;
        let second = create(&service, Some(&root)).await;
        create(&service, Some(&first)).await;

        let children = service.children(&root).await.unwrap();
        assert_eq!(
            children.keys(),
            vec![first.key.clone().unwrap(), second.key.clone().unwrap()]
        );
    }
}
