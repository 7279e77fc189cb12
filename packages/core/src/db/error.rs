//! Database Error Types
//!
//! This module defines error types for database operations, providing
//! clear error handling for connection, schema, query compilation and
//! path encoding failures.

use crate::models::PathError;
use std::path::PathBuf;
use thiserror::Error;

/// Database operation errors
///
/// Covers connection and initialization failures, SQL execution errors,
/// path codec type errors and dialect capability errors. Tree-level
/// failures (cycles, missing nodes) are handled by the service layer.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// A stored row could not be converted into a node
    #[error("Failed to decode row: {context}")]
    RowDecodeFailed { context: String },

    /// Stored or computed path is malformed
    #[error("Invalid tree path: {0}")]
    InvalidTreePath(#[from] PathError),

    /// The path codec was asked to write something other than a path
    #[error("Expected a path value for column '{column}', got {found}")]
    NotAPath { column: String, found: String },

    /// The dialect cannot compile or the store cannot execute an operation
    #[error("Backend '{dialect}' does not support {operation}")]
    UnsupportedBackend { dialect: String, operation: String },

    /// Tree configuration rejected
    #[error("Invalid tree configuration: {0}")]
    InvalidConfig(String),

    /// Properties payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create a row decode error with context
    pub fn row_decode(context: impl Into<String>) -> Self {
        Self::RowDecodeFailed {
            context: context.into(),
        }
    }

    /// Create a path codec type error
    pub fn not_a_path(column: impl Into<String>, found: impl Into<String>) -> Self {
        Self::NotAPath {
            column: column.into(),
            found: found.into(),
        }
    }

    /// Create an unsupported backend error
    pub fn unsupported_backend(dialect: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::UnsupportedBackend {
            dialect: dialect.into(),
            operation: operation.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
