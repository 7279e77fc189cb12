//! LibsqlTreeStore - TreeStore Implementation for libsql
//!
//! Executes tree queries against an embedded libsql database through
//! [`DatabaseService`]. Only the prefix-scan dialect can run here: SQLite has
//! no label-path type, so a label-path configuration is rejected with
//! [`DatabaseError::UnsupportedBackend`] at construction.
//!
//! # Examples
//!
//! ```rust,no_run
//! use pathtree_core::db::{DatabaseService, LibsqlTreeStore, TreeStore};
//! use pathtree_core::TreeConfig;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/tree.db")).await?);
//!     let store = LibsqlTreeStore::new(db, TreeConfig::new("categories"))?;
//!     store.ensure_schema().await?;
//!     Ok(())
//! }
//! ```

use crate::config::TreeConfig;
use crate::db::database::DatabaseService;
use crate::db::dialect::{Dialect, DialectKind};
use crate::db::error::DatabaseError;
use crate::db::path_codec::{AttributeValue, PathCodec};
use crate::db::query::{key_value, SqlStatement, TreeFilter, TreeQuery};
use crate::db::tree_store::{NodeRecord, TreeStore, TreeTransaction};
use crate::models::{NodeKey, StoredNode};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::params::Params;
use libsql::{Connection, Row, Value};
use serde_json::Map;
use std::sync::Arc;
use tracing::debug;

/// Table layout shared by the store and its transactions.
#[derive(Debug)]
struct TreeSchema {
    config: TreeConfig,
    codec: PathCodec,
    dialect: Arc<dyn Dialect>,
}

impl TreeSchema {
    fn select_by_key(&self, key: &NodeKey) -> Result<SqlStatement, DatabaseError> {
        TreeQuery::new(&self.config, self.dialect.clone())
            .where_key(key)
            .build()
    }

    /// Convert a row selected with [`TreeQuery::node_columns`].
    ///
    /// Expected columns (in order): key, parent key, source (or NULL), path,
    /// properties (JSON text), created_at, modified_at.
    fn row_to_stored(&self, row: &Row) -> Result<StoredNode, DatabaseError> {
        let key = key_from_value(row.get_value(0)?)?.ok_or_else(|| {
            DatabaseError::row_decode(format!("{} is NULL", self.config.key_column))
        })?;
        let parent_key = key_from_value(row.get_value(1)?)?;

        let source = match row.get_value(2)? {
            Value::Null => None,
            Value::Text(text) => Some(text),
            Value::Integer(number) => Some(number.to_string()),
            other => {
                return Err(DatabaseError::row_decode(format!(
                    "unexpected path source value {:?}",
                    other
                )))
            }
        };

        let path = self
            .codec
            .read_attribute(&AttributeValue::try_from(row.get_value(3)?)?)?;

        let properties = match row.get_value(4)? {
            Value::Text(json) => serde_json::from_str(&json)?,
            Value::Null => serde_json::Value::Object(Map::new()),
            other => {
                return Err(DatabaseError::row_decode(format!(
                    "unexpected properties value {:?}",
                    other
                )))
            }
        };

        Ok(StoredNode {
            key,
            parent_key,
            source,
            path,
            properties,
            created_at: timestamp_from_value(row.get_value(5)?)?,
            modified_at: timestamp_from_value(row.get_value(6)?)?,
        })
    }

    async fn query_nodes(
        &self,
        conn: &Connection,
        statement: &SqlStatement,
    ) -> Result<Vec<StoredNode>, DatabaseError> {
        debug!(sql = %statement.sql, params = statement.params.len(), "Fetching tree nodes");

        let mut rows = conn
            .query(&statement.sql, Params::Positional(statement.params.clone()))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to query tree nodes: {}", e))
            })?;

        let mut nodes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            nodes.push(self.row_to_stored(&row)?);
        }
        Ok(nodes)
    }

    async fn find_node(
        &self,
        conn: &Connection,
        key: &NodeKey,
    ) -> Result<Option<StoredNode>, DatabaseError> {
        let statement = self.select_by_key(key)?;
        Ok(self.query_nodes(conn, &statement).await?.into_iter().next())
    }
}

/// libsql-backed [`TreeStore`]
pub struct LibsqlTreeStore {
    db: Arc<DatabaseService>,
    schema: Arc<TreeSchema>,
}

impl LibsqlTreeStore {
    /// Create a store for the tree table described by `config`.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` when `config` fails validation
    /// - `UnsupportedBackend` when `config.dialect` is not executable by SQLite
    pub fn new(db: Arc<DatabaseService>, config: TreeConfig) -> Result<Self, DatabaseError> {
        config.validate().map_err(DatabaseError::invalid_config)?;

        if config.dialect != DialectKind::PrefixScan {
            return Err(DatabaseError::unsupported_backend(
                config.dialect.as_str(),
                "execution on libsql",
            ));
        }

        let codec = PathCodec::new(config.path_column.clone(), config.transformer());
        let dialect = config.dialect.dialect();

        Ok(Self {
            db,
            schema: Arc::new(TreeSchema {
                config,
                codec,
                dialect,
            }),
        })
    }

    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }
}

#[async_trait]
impl TreeStore for LibsqlTreeStore {
    fn config(&self) -> &TreeConfig {
        &self.schema.config
    }

    fn dialect(&self) -> Arc<dyn Dialect> {
        self.schema.dialect.clone()
    }

    fn codec(&self) -> &PathCodec {
        &self.schema.codec
    }

    async fn ensure_schema(&self) -> Result<(), DatabaseError> {
        self.db.ensure_tree_table(&self.schema.config).await
    }

    async fn begin(&self) -> Result<Box<dyn TreeTransaction>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;

        conn.execute("BEGIN TRANSACTION", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;

        Ok(Box::new(LibsqlTreeTransaction {
            conn,
            schema: self.schema.clone(),
            finished: false,
        }))
    }

    async fn find_node(&self, key: &NodeKey) -> Result<Option<StoredNode>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        self.schema.find_node(&conn, key).await
    }

    async fn fetch_nodes(
        &self,
        statement: &SqlStatement,
    ) -> Result<Vec<StoredNode>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        self.schema.query_nodes(&conn, statement).await
    }

    async fn fetch_rows(
        &self,
        statement: &SqlStatement,
    ) -> Result<Vec<serde_json::Value>, DatabaseError> {
        debug!(sql = %statement.sql, "Fetching rows");
        let conn = self.db.connect_with_timeout().await?;

        let mut rows = conn
            .query(&statement.sql, Params::Positional(statement.params.clone()))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to query rows: {}", e)))?;

        let names: Vec<String> = (0..rows.column_count())
            .map(|index| rows.column_name(index).unwrap_or_default().to_string())
            .collect();

        let mut output = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            let mut object = Map::new();
            for (index, name) in names.iter().enumerate() {
                object.insert(name.clone(), value_to_json(row.get_value(index as i32)?));
            }
            output.push(serde_json::Value::Object(object));
        }
        Ok(output)
    }

    async fn delete_node(&self, key: &NodeKey) -> Result<u64, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let config = &self.schema.config;

        conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?",
                config.table, config.key_column
            ),
            Params::Positional(vec![key_value(key)]),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to delete node: {}", e)))
    }
}

/// Transaction on a dedicated libsql connection.
pub struct LibsqlTreeTransaction {
    conn: Connection,
    schema: Arc<TreeSchema>,
    finished: bool,
}

impl LibsqlTreeTransaction {
    async fn execute_raw(&self, sql: &str, params: Vec<Value>) -> Result<u64, DatabaseError> {
        debug!(sql = %sql, params = params.len(), "Executing tree statement");
        self.conn
            .execute(sql, Params::Positional(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute '{}': {}", sql, e)))
    }

    fn ensure_open(&self) -> Result<(), DatabaseError> {
        if self.finished {
            return Err(DatabaseError::sql_execution("Transaction already finished"));
        }
        Ok(())
    }
}

#[async_trait]
impl TreeTransaction for LibsqlTreeTransaction {
    async fn find_node(&mut self, key: &NodeKey) -> Result<Option<StoredNode>, DatabaseError> {
        self.ensure_open()?;
        self.schema.find_node(&self.conn, key).await
    }

    async fn insert_node(&mut self, record: &NodeRecord) -> Result<NodeKey, DatabaseError> {
        self.ensure_open()?;
        let config = &self.schema.config;

        let mut columns = Vec::new();
        let mut values = Vec::new();

        if let Some(key) = &record.key {
            columns.push(config.key_column.as_str());
            values.push(key_value(key));
        }
        columns.push(config.parent_column.as_str());
        values.push(record.parent_key.as_ref().map(key_value).unwrap_or(Value::Null));
        if let Some(source_column) = config.source_column() {
            columns.push(source_column);
            values.push(
                record
                    .source
                    .clone()
                    .map(Value::Text)
                    .unwrap_or(Value::Null),
            );
        }
        if let Some(path) = &record.path {
            columns.push(config.path_column.as_str());
            values.push(Value::Text(path.clone()));
        }
        columns.extend(["properties", "created_at", "modified_at"]);
        let timestamp = record.timestamp.to_rfc3339();
        values.push(Value::Text(serde_json::to_string(&record.properties)?));
        values.push(Value::Text(timestamp.clone()));
        values.push(Value::Text(timestamp));

        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            config.table,
            columns.join(", "),
            placeholders
        );
        self.execute_raw(&sql, values).await?;

        Ok(match &record.key {
            Some(key) => key.clone(),
            None => NodeKey::Integer(self.conn.last_insert_rowid()),
        })
    }

    async fn update_node(&mut self, record: &NodeRecord) -> Result<u64, DatabaseError> {
        self.ensure_open()?;
        let config = &self.schema.config;
        let key = record
            .key
            .as_ref()
            .ok_or_else(|| DatabaseError::sql_execution("Cannot update a node without a key"))?;

        let sql = format!(
            "UPDATE {} SET {} = ?, properties = ?, modified_at = ? WHERE {} = ?",
            config.table, config.parent_column, config.key_column
        );
        let values = vec![
            record.parent_key.as_ref().map(key_value).unwrap_or(Value::Null),
            Value::Text(serde_json::to_string(&record.properties)?),
            Value::Text(record.timestamp.to_rfc3339()),
            key_value(key),
        ];

        self.execute_raw(&sql, values).await
    }

    async fn update_path_quietly(
        &mut self,
        key: &NodeKey,
        path: &str,
    ) -> Result<(), DatabaseError> {
        self.ensure_open()?;
        let config = &self.schema.config;

        let sql = format!(
            "UPDATE {} SET {} = ? WHERE {} = ?",
            config.table, config.path_column, config.key_column
        );
        self.execute_raw(&sql, vec![Value::Text(path.to_string()), key_value(key)])
            .await?;
        Ok(())
    }

    async fn execute(&mut self, statement: &SqlStatement) -> Result<u64, DatabaseError> {
        self.ensure_open()?;
        self.execute_raw(&statement.sql, statement.params.clone())
            .await
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        self.ensure_open()?;
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            let _rollback = self.conn.execute("ROLLBACK", ()).await;
            self.finished = true;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }
        self.finished = true;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.conn.execute("ROLLBACK", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to roll back transaction: {}", e))
        })?;
        Ok(())
    }
}

fn key_from_value(value: Value) -> Result<Option<NodeKey>, DatabaseError> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(number) => Ok(Some(NodeKey::Integer(number))),
        Value::Text(text) => Ok(Some(NodeKey::Text(text))),
        other => Err(DatabaseError::row_decode(format!(
            "unexpected key value {:?}",
            other
        ))),
    }
}

fn timestamp_from_value(value: Value) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    match value {
        Value::Null => Ok(None),
        Value::Text(text) => parse_timestamp(&text).map(Some),
        other => Err(DatabaseError::row_decode(format!(
            "unexpected timestamp value {:?}",
            other
        ))),
    }
}

/// Parse timestamp from database - handles both SQLite and RFC3339 formats
///
/// SQLite CURRENT_TIMESTAMP returns: "YYYY-MM-DD HH:MM:SS"
/// Rows written by the store use RFC3339: "YYYY-MM-DDTHH:MM:SS.ffffff+00:00"
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    Err(DatabaseError::row_decode(format!(
        "Unable to parse timestamp '{}' as SQLite or RFC3339 format",
        s
    )))
}

fn value_to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(number) => serde_json::Value::from(number),
        Value::Real(number) => serde_json::Number::from_f64(number)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(text) => serde_json::Value::String(text),
        Value::Blob(bytes) => serde_json::Value::from(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KeyStrategy, PathSource};
    use serde_json::json;
    use tempfile::TempDir;

    async fn store_with(config: TreeConfig) -> (LibsqlTreeStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            DatabaseService::new(temp_dir.path().join("test.db"))
                .await
                .unwrap(),
        );
        let store = LibsqlTreeStore::new(db, config).unwrap();
        store.ensure_schema().await.unwrap();
        (store, temp_dir)
    }

    fn record(parent: Option<NodeKey>, path: Option<&str>) -> NodeRecord {
        NodeRecord {
            key: None,
            parent_key: parent,
            source: None,
            path: path.map(str::to_string),
            properties: json!({"name": "node"}),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_label_path_dialect_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            DatabaseService::new(temp_dir.path().join("test.db"))
                .await
                .unwrap(),
        );

        let result = LibsqlTreeStore::new(
            db,
            TreeConfig::new("categories").with_dialect(DialectKind::LabelPath),
        );

        assert!(matches!(
            result,
            Err(DatabaseError::UnsupportedBackend { .. })
        ));
    }

    #[tokio::test]
    async fn test_insert_generates_integer_keys() {
        let (store, _temp) = store_with(TreeConfig::new("categories")).await;

        let mut tx = store.begin().await.unwrap();
        let first = tx.insert_node(&record(None, None)).await.unwrap();
        let second = tx
            .insert_node(&record(Some(first.clone()), None))
            .await
            .unwrap();
        tx.update_path_quietly(&first, "1").await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, NodeKey::Integer(1));
        assert_eq!(second, NodeKey::Integer(2));

        let stored = store.find_node(&first).await.unwrap().unwrap();
        assert_eq!(stored.path.unwrap().as_str(), "1");
        assert_eq!(stored.properties, json!({"name": "node"}));
        assert!(stored.created_at.is_some());

        let child = store.find_node(&second).await.unwrap().unwrap();
        assert_eq!(child.parent_key, Some(first));
        assert!(child.path.is_none());
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let config = TreeConfig::new("categories")
            .with_key_strategy(KeyStrategy::Uuid)
            .with_path_source(PathSource::Column("slug".to_string()));
        let (store, _temp) = store_with(config).await;

        let key = NodeKey::generate();
        let mut tx = store.begin().await.unwrap();
        tx.insert_node(&NodeRecord {
            key: Some(key.clone()),
            source: Some("books".to_string()),
            ..record(None, Some("books"))
        })
        .await
        .unwrap();
        tx.rollback().await.unwrap();

        assert!(store.find_node(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_rows_returns_json_objects() {
        let (store, _temp) = store_with(TreeConfig::new("categories")).await;

        let mut tx = store.begin().await.unwrap();
        let key = tx.insert_node(&record(None, Some("1"))).await.unwrap();
        tx.commit().await.unwrap();

        let rows = store
            .fetch_rows(&SqlStatement {
                sql: "SELECT id, path FROM categories WHERE id = ?".to_string(),
                params: vec![key_value(&key)],
            })
            .await
            .unwrap();

        assert_eq!(rows, vec![json!({"id": 1, "path": "1"})]);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-01-02 03:04:05").is_ok());
        assert!(parse_timestamp("2024-01-02T03:04:05.123456+00:00").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
