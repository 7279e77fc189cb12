//! Database Connection Management
//!
//! This module provides the database connection and tree table
//! initialization using libsql (embedded SQLite).
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf for the database file
//! - **Idempotent DDL**: Tree tables are created with `CREATE TABLE IF NOT EXISTS`
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Foreign keys**: Enabled per connection so parent deletion cascades
//! - **Case-sensitive LIKE**: Prefix scans must not fold `A.x` into `a.x`
//!
//! # Database Connection Patterns
//!
//! **Use `connect_with_timeout()` in async functions.** It applies the
//! per-connection pragmas (busy timeout, foreign keys, case-sensitive LIKE)
//! that every tree operation relies on.
//!
//! ```no_run
//! # use pathtree_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/tree.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{KeyStrategy, TreeConfig};
use crate::db::error::DatabaseError;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Database service for managing the libsql connection and tree tables
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Enable WAL mode
    ///
    /// Tree tables are created separately with [`ensure_tree_table`](Self::ensure_tree_table).
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Pragma initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        let conn = service.connect_with_timeout().await?;
        service
            .execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements may return rows, so query() is used instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Get a raw connection without per-connection pragmas
    ///
    /// Only use this in synchronous, single-threaded contexts. Tree operations
    /// need the pragmas applied by [`connect_with_timeout`](Self::connect_with_timeout).
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with busy timeout and tree pragmas configured
    ///
    /// Sets a 5-second busy timeout so concurrent operations wait instead of
    /// failing immediately with `SQLITE_BUSY`, enables foreign keys and makes
    /// `LIKE` case-sensitive for prefix scans.
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;
        self.execute_pragma(&conn, "PRAGMA case_sensitive_like = ON")
            .await?;

        Ok(conn)
    }

    /// Create the tree table described by `config` and its indexes
    ///
    /// Safe to call multiple times.
    ///
    /// # Schema
    ///
    /// - key column: `INTEGER PRIMARY KEY AUTOINCREMENT` or `TEXT PRIMARY KEY`
    /// - parent column: nullable, self-referencing, cascades on delete
    /// - optional unique path source column
    /// - path column: `TEXT`, indexed
    /// - `properties JSON`, `created_at`, `modified_at`
    pub async fn ensure_tree_table(&self, config: &TreeConfig) -> Result<(), DatabaseError> {
        config.validate().map_err(DatabaseError::invalid_config)?;

        let conn = self.connect_with_timeout().await?;

        let (key_definition, parent_type) = match config.key_strategy {
            KeyStrategy::AutoIncrement => ("INTEGER PRIMARY KEY AUTOINCREMENT", "INTEGER"),
            KeyStrategy::Uuid => ("TEXT PRIMARY KEY", "TEXT"),
        };

        let source_definition = config
            .source_column()
            .map(|column| format!("{} TEXT NOT NULL UNIQUE,\n", column))
            .unwrap_or_default();

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                {key} {key_definition},
                {parent} {parent_type},
                {source_definition}{path} TEXT,
                properties JSON NOT NULL DEFAULT '{{}}',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                modified_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY ({parent}) REFERENCES {table}({key}) ON DELETE CASCADE
            )",
            table = config.table,
            key = config.key_column,
            key_definition = key_definition,
            parent = config.parent_column,
            parent_type = parent_type,
            source_definition = source_definition,
            path = config.path_column,
        );

        debug!(table = %config.table, "Ensuring tree table");
        conn.execute(&ddl, ()).await.map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create table '{}': {}",
                config.table, e
            ))
        })?;

        for column in [&config.path_column, &config.parent_column] {
            let index = format!("idx_{}_{}", config.table, column);
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                    index, config.table, column
                ),
                (),
            )
            .await
            .map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create index '{}': {}",
                    index, e
                ))
            })?;
        }

        Ok(())
    }
}
