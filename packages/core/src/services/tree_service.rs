//! Tree Service - Path Materialization Engine
//!
//! `TreeService` persists tree nodes through a [`TreeStore`] and keeps every
//! stored path consistent with the parent references:
//!
//! - **Create**: the path is built from the parent's path and the node's path
//!   source value, either before insert or (for backend-generated keys) right
//!   after it with a quiet update
//! - **Save**: a parent change is checked for cycles against the new parent's
//!   path, then the row and the whole subtree's paths are rewritten in the same
//!   transaction
//! - **Read**: ancestors, descendants, roots and eager loading compile through
//!   the store's dialect
//!
//! # Examples
//!
//! ```rust,no_run
//! use pathtree_core::db::{DatabaseService, LibsqlTreeStore, TreeStore};
//! use pathtree_core::models::TreeNode;
//! use pathtree_core::services::TreeService;
//! use pathtree_core::TreeConfig;
//! use serde_json::json;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/tree.db")).await?);
//!     let store = Arc::new(LibsqlTreeStore::new(db, TreeConfig::new("categories"))?);
//!     store.ensure_schema().await?;
//!
//!     let service = TreeService::new(store);
//!     let root = service.create(TreeNode::new(json!({"name": "Books"}))).await?;
//!     let child = service
//!         .create(TreeNode::new(json!({"name": "Fiction"})).with_parent(&root))
//!         .await?;
//!
//!     assert_eq!(child.depth(), Some(2));
//!     Ok(())
//! }
//! ```

use crate::behaviors::{
    build_path, has_circular_reference, path_assignment, DefaultTreeBehavior, PathAssignment,
    TreeBehavior,
};
use crate::config::{KeyStrategy, TreeConfig};
use crate::db::{
    AttributeValue, DeepRelation, NodeRecord, SubtreeRebuild, TreeFilter, TreeQuery, TreeStore,
    TreeTransaction, WhereGroup,
};
use crate::models::{NodeCollection, NodeKey, Path, TreeNode};
use crate::services::error::TreeServiceError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a successful save inside its transaction.
struct SaveOutcome {
    moved: bool,
    parent_key: Option<NodeKey>,
    path: Option<Path>,
}

/// Tree persistence and query service
pub struct TreeService {
    store: Arc<dyn TreeStore>,
    behavior: Arc<dyn TreeBehavior>,
}

impl TreeService {
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self {
            store,
            behavior: Arc::new(DefaultTreeBehavior),
        }
    }

    /// Replace the lifecycle hooks.
    pub fn with_behavior(mut self, behavior: Arc<dyn TreeBehavior>) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn store(&self) -> &Arc<dyn TreeStore> {
        &self.store
    }

    pub fn config(&self) -> &TreeConfig {
        self.store.config()
    }

    //
    // WRITES
    //

    /// Insert a new node and assign its path.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if the node is already persisted, its key does not
    ///   fit the key strategy, or its path source value is missing
    /// - `InvalidParent` if the parent does not exist or has no path yet
    /// - `InvalidPath` if the path source value cannot be a path segment
    pub async fn create(&self, mut node: TreeNode) -> Result<TreeNode, TreeServiceError> {
        self.prepare_new(&mut node)?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let (key, path) = match self.create_in(tx.as_mut(), &node, now).await {
            Ok(created) => created,
            Err(e) => {
                let _rollback = tx.rollback().await;
                return Err(e);
            }
        };
        tx.commit().await?;

        node.mark_created(key, now);
        if let Some(path) = path {
            node.assign_path(path);
        }

        debug!(key = ?node.key, path = ?node.path().map(Path::as_str), "Created tree node");
        Ok(node)
    }

    /// Persist changes to an existing node.
    ///
    /// A parent change is checked for circular references before anything is
    /// written; on success the node's path and every descendant path are
    /// rewritten in the same transaction. Reassigning the current parent is
    /// not a move and rewrites nothing.
    ///
    /// # Errors
    ///
    /// - `CircularReference` if the new parent is the node or one of its
    ///   descendants; the transaction is rolled back and the node's parent
    ///   reference is restored to the persisted one
    /// - `InvalidParent` if the new parent does not exist
    /// - `ValidationFailed` if the node was never created or its path source
    ///   value changed
    pub async fn save(&self, node: &mut TreeNode) -> Result<(), TreeServiceError> {
        let key = match (&node.key, node.is_persisted()) {
            (Some(key), true) => key.clone(),
            _ => {
                return Err(TreeServiceError::validation_failed(
                    "node has not been created yet",
                ))
            }
        };
        reject_unsaved_parent(node)?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let outcome = match self.save_in(tx.as_mut(), &key, node, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let _rollback = tx.rollback().await;
                if e.is_circular_reference() {
                    node.mark_rejected();
                }
                return Err(e);
            }
        };
        tx.commit().await?;

        node.set_parent_key(outcome.parent_key);
        if let Some(path) = outcome.path {
            node.assign_path(path);
        }
        node.mark_saved(outcome.moved, now);
        Ok(())
    }

    /// Delete a node. Descendants are removed by the parent foreign key.
    pub async fn delete(&self, key: &NodeKey) -> Result<u64, TreeServiceError> {
        Ok(self.store.delete_node(key).await?)
    }

    fn prepare_new(&self, node: &mut TreeNode) -> Result<(), TreeServiceError> {
        let config = self.config();

        if node.is_persisted() {
            return Err(TreeServiceError::validation_failed(
                "node is already persisted; use save",
            ));
        }
        reject_unsaved_parent(node)?;

        match config.key_strategy {
            KeyStrategy::Uuid => {
                if node.key.is_none() {
                    node.key = Some(NodeKey::generate());
                }
            }
            KeyStrategy::AutoIncrement => {
                if let Some(NodeKey::Text(key)) = &node.key {
                    return Err(TreeServiceError::validation_failed(format!(
                        "text key '{}' in an auto-increment table",
                        key
                    )));
                }
            }
        }

        match (config.source_column(), &node.source) {
            (Some(column), None) => Err(TreeServiceError::validation_failed(format!(
                "missing value for path source column '{}'",
                column
            ))),
            (None, Some(_)) => Err(TreeServiceError::validation_failed(
                "node carries a path source value but the table uses its key",
            )),
            _ => Ok(()),
        }
    }

    async fn create_in(
        &self,
        tx: &mut dyn TreeTransaction,
        node: &TreeNode,
        now: DateTime<Utc>,
    ) -> Result<(NodeKey, Option<Path>), TreeServiceError> {
        let config = self.config();
        let codec = self.store.codec();

        let parent_path = match node.parent_key() {
            Some(parent_key) => Some(self.parent_path_in(tx, parent_key).await?),
            None => None,
        };

        let assign = self.behavior.should_assign_path(node);
        let timing = path_assignment(config);

        let mut path = None;
        if assign && timing == PathAssignment::BeforeInsert {
            let source = node
                .path_source()
                .ok_or_else(|| TreeServiceError::validation_failed("missing path source value"))?;
            path = Some(build_path(codec, parent_path.as_ref(), &source)?);
        }

        let record = NodeRecord {
            key: node.key.clone(),
            parent_key: node.parent_key().cloned(),
            source: node.source.clone(),
            path: codec.write(&AttributeValue::from(path.clone()))?,
            properties: node.properties.clone(),
            timestamp: now,
        };
        let key = tx.insert_node(&record).await?;

        if assign && timing == PathAssignment::AfterInsert {
            let built = build_path(codec, parent_path.as_ref(), &key.to_string())?;
            let stored = codec.encode(&built)?;
            tx.update_path_quietly(&key, &stored).await?;
            path = Some(built);
        }

        Ok((key, path))
    }

    async fn save_in(
        &self,
        tx: &mut dyn TreeTransaction,
        key: &NodeKey,
        node: &TreeNode,
        now: DateTime<Utc>,
    ) -> Result<SaveOutcome, TreeServiceError> {
        let config = self.config();
        let codec = self.store.codec();

        let current = tx
            .find_node(key)
            .await?
            .ok_or_else(|| TreeServiceError::node_not_found(key))?;

        if config.source_column().is_some() && current.source != node.source {
            return Err(TreeServiceError::validation_failed(
                "the path source value of a persisted node cannot change",
            ));
        }
        let source = node
            .path_source()
            .ok_or_else(|| TreeServiceError::validation_failed("missing path source value"))?;

        // An untouched parent is not written, so a stale copy cannot undo a
        // move made through another copy. A changed parent is a move only if
        // it differs from the stored row.
        let parent_key = if node.is_moving() {
            node.parent_key().cloned()
        } else {
            current.parent_key.clone()
        };
        let moved = parent_key != current.parent_key;
        let new_parent_path = match (moved, parent_key.as_ref()) {
            (true, Some(parent_key)) => Some(self.parent_path_in(tx, parent_key).await?),
            _ => None,
        };

        if moved && self.behavior.should_detect_circular_reference(node) {
            if let Some(parent_path) = &new_parent_path {
                if has_circular_reference(parent_path, &source) {
                    self.behavior.on_circular_reference(node, parent_path);
                    return Err(TreeServiceError::circular_reference(format!(
                        "node {} cannot be moved below {}",
                        key, parent_path
                    )));
                }
            }
        }

        tx.update_node(&NodeRecord {
            key: Some(key.clone()),
            parent_key: parent_key.clone(),
            source: node.source.clone(),
            path: None,
            properties: node.properties.clone(),
            timestamp: now,
        })
        .await?;

        if !(moved && self.behavior.should_rebuild_subtree(node)) {
            return Ok(SaveOutcome {
                moved,
                parent_key,
                path: current.path,
            });
        }

        let old_path = current.path.ok_or_else(|| {
            TreeServiceError::validation_failed(format!("node {} has no stored path", key))
        })?;
        let new_path = build_path(codec, new_parent_path.as_ref(), &source)?;

        let rebuild = SubtreeRebuild::new(old_path.clone(), new_parent_path);
        let statement = rebuild.compile(config, self.store.dialect().as_ref())?;
        let rows = tx.execute(&statement).await?;

        info!(
            key = %key,
            from = %old_path,
            to = %new_path,
            rows,
            "Moved subtree"
        );

        Ok(SaveOutcome {
            moved,
            parent_key,
            path: Some(new_path),
        })
    }

    async fn parent_path_in(
        &self,
        tx: &mut dyn TreeTransaction,
        parent_key: &NodeKey,
    ) -> Result<Path, TreeServiceError> {
        tx.find_node(parent_key)
            .await?
            .and_then(|parent| parent.path)
            .ok_or_else(|| TreeServiceError::invalid_parent(parent_key))
    }

    //
    // READS
    //

    /// Start a query over this tree, compiled with the store's dialect.
    pub fn query(&self) -> TreeQuery {
        TreeQuery::new(self.config(), self.store.dialect())
    }

    /// Run a node query.
    pub async fn fetch(&self, query: &TreeQuery) -> Result<NodeCollection, TreeServiceError> {
        let statement = query.build()?;
        let rows = self.store.fetch_nodes(&statement).await?;
        Ok(rows.into_iter().map(TreeNode::from_stored).collect())
    }

    pub async fn find(&self, key: &NodeKey) -> Result<Option<TreeNode>, TreeServiceError> {
        Ok(self
            .store
            .find_node(key)
            .await?
            .map(TreeNode::from_stored))
    }

    pub async fn get(&self, key: &NodeKey) -> Result<TreeNode, TreeServiceError> {
        self.find(key)
            .await?
            .ok_or_else(|| TreeServiceError::node_not_found(key))
    }

    pub async fn parent(&self, node: &TreeNode) -> Result<Option<TreeNode>, TreeServiceError> {
        match node.parent_key() {
            Some(parent_key) => self.find(parent_key).await,
            None => Ok(None),
        }
    }

    pub async fn children(&self, node: &TreeNode) -> Result<NodeCollection, TreeServiceError> {
        let key = require_key(node)?;
        let query = self
            .query()
            .where_parent(key)
            .order_by(self.config().qualified(&self.config().key_column), false);
        self.fetch(&query).await
    }

    /// Strict ancestors, root first.
    pub async fn ancestors(&self, node: &TreeNode) -> Result<NodeCollection, TreeServiceError> {
        let key = require_key(node)?;
        let query = self
            .query()
            .where_self_or_ancestor_of(node)
            .where_key_not(key)
            .order_by_depth();
        self.fetch(&query).await
    }

    /// Strict descendants, shallowest first.
    pub async fn descendants(
        &self,
        node: &TreeNode,
    ) -> Result<NodeCollection, TreeServiceError> {
        let key = require_key(node)?;
        let query = self
            .query()
            .where_self_or_descendant_of(node)
            .where_key_not(key)
            .order_by_depth();
        self.fetch(&query).await
    }

    /// The node followed by its ancestors, nearest first.
    pub async fn join_ancestors(
        &self,
        node: &TreeNode,
    ) -> Result<NodeCollection, TreeServiceError> {
        Ok(self
            .ancestors(node)
            .await?
            .sort_by_depth_desc()
            .prepend(node.clone()))
    }

    pub async fn roots(&self) -> Result<NodeCollection, TreeServiceError> {
        let query = self
            .query()
            .where_root()
            .order_by(self.config().qualified(&self.config().key_column), false);
        self.fetch(&query).await
    }

    /// Ancestors of several nodes with one query, keyed by node.
    pub async fn ancestors_of_many(
        &self,
        nodes: &[TreeNode],
    ) -> Result<HashMap<NodeKey, NodeCollection>, TreeServiceError> {
        let candidates = self
            .fetch_related(nodes, |group, node| group.or_where_self_or_ancestor_of(node))
            .await?;

        Ok(match_related(nodes, &candidates, |candidate, node| {
            candidate.is_ancestor_of(node)
        }))
    }

    /// Descendants of several nodes with one query, keyed by node.
    pub async fn descendants_of_many(
        &self,
        nodes: &[TreeNode],
    ) -> Result<HashMap<NodeKey, NodeCollection>, TreeServiceError> {
        let candidates = self
            .fetch_related(nodes, |group, node| {
                group.or_where_self_or_descendant_of(node)
            })
            .await?;

        Ok(match_related(nodes, &candidates, |candidate, node| {
            candidate.is_descendant_of(node)
        }))
    }

    async fn fetch_related<F>(
        &self,
        nodes: &[TreeNode],
        predicate: F,
    ) -> Result<NodeCollection, TreeServiceError>
    where
        F: Fn(WhereGroup, &TreeNode) -> WhereGroup,
    {
        if nodes.iter().all(|node| node.path().is_none()) {
            return Ok(NodeCollection::default());
        }

        let query = self
            .query()
            .where_group(|group| nodes.iter().fold(group, |group, node| predicate(group, node)))
            .order_by_depth();
        self.fetch(&query).await
    }

    /// Rows of `relation` attached to `node` or any of its descendants.
    pub async fn fetch_deep(
        &self,
        relation: &DeepRelation,
        node: &TreeNode,
    ) -> Result<Vec<serde_json::Value>, TreeServiceError> {
        let statement = relation.compile(self.config(), self.store.dialect(), node)?;
        Ok(self.store.fetch_rows(&statement).await?)
    }
}

fn require_key(node: &TreeNode) -> Result<&NodeKey, TreeServiceError> {
    node.key
        .as_ref()
        .ok_or_else(|| TreeServiceError::validation_failed("node has no key"))
}

fn reject_unsaved_parent(node: &TreeNode) -> Result<(), TreeServiceError> {
    if node.has_unsaved_parent() {
        return Err(TreeServiceError::validation_failed(
            "parent node has not been created yet",
        ));
    }
    Ok(())
}

fn match_related<F>(
    nodes: &[TreeNode],
    candidates: &NodeCollection,
    is_related: F,
) -> HashMap<NodeKey, NodeCollection>
where
    F: Fn(&TreeNode, &TreeNode) -> bool,
{
    nodes
        .iter()
        .filter_map(|node| {
            let key = node.key.clone()?;
            Some((key, candidates.filter(|candidate| is_related(candidate, node))))
        })
        .collect()
}

// Scenario tests in separate module
#[cfg(test)]
#[path = "tree_service_test.rs"]
mod tree_service_test;
