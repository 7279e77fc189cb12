//! TreeStore Trait - Storage Capability Contract
//!
//! The tree service needs only a narrow contract from storage: typed reads
//! of tree rows, prefix/range queries compiled by a [`Dialect`], one bulk
//! update, a quiet path write and transactions. [`TreeStore`] and
//! [`TreeTransaction`] describe that contract so the path engine does not
//! depend on a particular backend.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All I/O methods are async
//! 2. **Explicit transactions**: Cycle detection, the row write and the subtree
//!    rebuild of a move all run through one [`TreeTransaction`]
//! 3. **Raw paths at the boundary**: Stores hand back [`StoredNode`]s whose
//!    paths were read through the store's [`PathCodec`]

use crate::config::TreeConfig;
use crate::db::dialect::Dialect;
use crate::db::error::DatabaseError;
use crate::db::path_codec::PathCodec;
use crate::db::query::SqlStatement;
use crate::models::{NodeKey, StoredNode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Column values written by inserts and updates.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    /// `None` lets the backend assign the key
    pub key: Option<NodeKey>,
    pub parent_key: Option<NodeKey>,
    pub source: Option<String>,
    /// Encoded path, `None` when it is assigned after insert
    pub path: Option<String>,
    pub properties: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Persistence backend for one tree table.
///
/// Implementations must be `Send + Sync` so a store can be shared across tasks.
#[async_trait]
pub trait TreeStore: Send + Sync {
    fn config(&self) -> &TreeConfig;

    /// Dialect queries for this store must be compiled with.
    fn dialect(&self) -> Arc<dyn Dialect>;

    fn codec(&self) -> &PathCodec;

    /// Create the tree table if it does not exist.
    async fn ensure_schema(&self) -> Result<(), DatabaseError>;

    /// Start a transaction.
    async fn begin(&self) -> Result<Box<dyn TreeTransaction>, DatabaseError>;

    async fn find_node(&self, key: &NodeKey) -> Result<Option<StoredNode>, DatabaseError>;

    /// Run a compiled `SELECT` of node columns.
    async fn fetch_nodes(&self, statement: &SqlStatement)
        -> Result<Vec<StoredNode>, DatabaseError>;

    /// Run an arbitrary `SELECT`, returning each row as a JSON object keyed by column name.
    async fn fetch_rows(
        &self,
        statement: &SqlStatement,
    ) -> Result<Vec<serde_json::Value>, DatabaseError>;

    /// Delete a node; descendants follow through the parent foreign key.
    async fn delete_node(&self, key: &NodeKey) -> Result<u64, DatabaseError>;
}

/// Unit of work on a [`TreeStore`].
///
/// Dropping an unfinished transaction abandons it; the backend rolls it back
/// when the connection closes.
#[async_trait]
pub trait TreeTransaction: Send {
    async fn find_node(&mut self, key: &NodeKey) -> Result<Option<StoredNode>, DatabaseError>;

    /// Insert a row, returning its key (generated when `record.key` is `None`).
    async fn insert_node(&mut self, record: &NodeRecord) -> Result<NodeKey, DatabaseError>;

    /// Write the parent reference and payload of an existing row, bumping `modified_at`.
    async fn update_node(&mut self, record: &NodeRecord) -> Result<u64, DatabaseError>;

    /// Write only the path column, leaving timestamps untouched.
    async fn update_path_quietly(
        &mut self,
        key: &NodeKey,
        path: &str,
    ) -> Result<(), DatabaseError>;

    /// Execute a compiled bulk statement, returning affected rows.
    async fn execute(&mut self, statement: &SqlStatement) -> Result<u64, DatabaseError>;

    async fn commit(&mut self) -> Result<(), DatabaseError>;

    async fn rollback(&mut self) -> Result<(), DatabaseError>;
}
