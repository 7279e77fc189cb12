//! Pathtree Core - Materialized-Path Trees
//!
//! This crate stores hierarchical records in an ordinary relational table by
//! keeping, for every row, the full chain of ancestor identifiers in one
//! dot-separated path column.
//!
//! # Architecture
//!
//! - **One column of ancestry**: Ancestor and descendant queries are prefix
//!   predicates on the path column; no recursive queries are needed
//! - **Pluggable dialects**: A label-path dialect compiles PostgreSQL `ltree`
//!   operators; a prefix-scan dialect compiles portable `IN`/`LIKE` SQL that
//!   runs on the embedded libsql backend
//! - **Transactional moves**: Cycle detection, the row write and the subtree
//!   rebuild of a parent change run in one transaction
//!
//! # Modules
//!
//! - [`models`] - Path values, segment transformers, tree nodes and collections
//! - [`behaviors`] - Lifecycle hooks deciding path assignment and cycle checks
//! - [`services`] - `TreeService` for creates, moves and tree reads
//! - [`db`] - Database layer: dialects, query compiler, path codec, libsql store
//! - [`config`] - Tree table configuration

pub mod behaviors;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use behaviors::*;
pub use config::{is_identifier, KeyStrategy, PathSource, TreeConfig};
pub use db::{DatabaseError, DialectKind};
pub use models::*;
pub use services::*;
