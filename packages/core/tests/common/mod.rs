//! Shared helpers for tree integration tests

#![allow(dead_code)]

use anyhow::Result;
use pathtree_core::{
    db::{DatabaseService, LibsqlTreeStore, TreeStore},
    services::TreeService,
    NodeCollection, TreeConfig, TreeNode,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber; `RUST_LOG=pathtree_core=debug` shows compiled SQL.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Test helper: Create a test environment
///
/// Returns (service, store, _temp_dir) - temp_dir must be kept alive for test duration
pub async fn create_test_env(
    config: TreeConfig,
) -> Result<(TreeService, Arc<LibsqlTreeStore>, TempDir)> {
    init_tracing();

    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");

    let db = Arc::new(DatabaseService::new(db_path).await?);
    let store = Arc::new(LibsqlTreeStore::new(db, config)?);
    store.ensure_schema().await?;

    let service = TreeService::new(store.clone());
    Ok((service, store, temp_dir))
}

/// Create a node keyed by the table's key strategy under `parent`.
pub async fn create_node(service: &TreeService, parent: Option<&TreeNode>) -> Result<TreeNode> {
    let mut node = TreeNode::new(json!({}));
    if let Some(parent) = parent {
        node.associate(parent);
    }
    Ok(service.create(node).await?)
}

/// Create a node whose path segment comes from a custom source column.
pub async fn create_named(
    service: &TreeService,
    source: &str,
    parent: Option<&TreeNode>,
) -> Result<TreeNode> {
    let mut node = TreeNode::new(json!({ "name": source })).with_source(source);
    if let Some(parent) = parent {
        node.associate(parent);
    }
    Ok(service.create(node).await?)
}

/// Stored path values, in collection order.
pub fn paths(nodes: &NodeCollection) -> Vec<String> {
    nodes
        .iter()
        .filter_map(|node| node.path().map(|path| path.as_str().to_string()))
        .collect()
}

/// Stored path values, sorted.
pub fn sorted_paths(nodes: &NodeCollection) -> Vec<String> {
    let mut output = paths(nodes);
    output.sort();
    output
}

/// Current stored path of a node.
pub async fn stored_path(service: &TreeService, node: &TreeNode) -> Result<String> {
    let key = node
        .key
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("node has no key"))?;
    let stored = service.get(key).await?;
    Ok(stored
        .path()
        .map(|path| path.as_str().to_string())
        .unwrap_or_default())
}
