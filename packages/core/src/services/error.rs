//! Service Layer Error Types
//!
//! This module defines error types for tree service operations, layering
//! tree rules (cycles, missing nodes, invalid parents) over database errors.

use crate::db::DatabaseError;
use crate::models::PathError;
use thiserror::Error;

/// Tree service errors
#[derive(Error, Debug)]
pub enum TreeServiceError {
    /// Node not found by key
    #[error("Node not found: {key}")]
    NodeNotFound { key: String },

    /// The node cannot be written in its current state
    #[error("Node validation failed: {0}")]
    ValidationFailed(String),

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    DatabaseError(#[from] DatabaseError),

    /// A path could not be built
    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathError),

    /// Parent reference does not point at a usable node
    #[error("Invalid parent node: {parent_key}")]
    InvalidParent { parent_key: String },

    /// The new parent is the node itself or one of its descendants
    #[error("Circular reference detected: {context}")]
    CircularReference { context: String },
}

impl TreeServiceError {
    /// Create a node not found error
    pub fn node_not_found(key: impl ToString) -> Self {
        Self::NodeNotFound {
            key: key.to_string(),
        }
    }

    /// Create a validation error
    pub fn validation_failed(msg: impl Into<String>) -> Self {
        Self::ValidationFailed(msg.into())
    }

    /// Create an invalid parent error
    pub fn invalid_parent(parent_key: impl ToString) -> Self {
        Self::InvalidParent {
            parent_key: parent_key.to_string(),
        }
    }

    /// Create a circular reference error
    pub fn circular_reference(context: impl Into<String>) -> Self {
        Self::CircularReference {
            context: context.into(),
        }
    }

    pub fn is_circular_reference(&self) -> bool {
        matches!(self, Self::CircularReference { .. })
    }
}
