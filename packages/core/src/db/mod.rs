//! Database Layer
//!
//! This module handles everything between tree semantics and SQL:
//!
//! - Database initialization and connection management (libsql)
//! - The path column codec
//! - Backend dialects and the tree query compiler
//! - The `TreeStore` capability contract and its libsql implementation
//!
//! # Architecture
//!
//! Queries are compiled by a [`Dialect`] chosen once from
//! [`TreeConfig::dialect`](crate::TreeConfig). The label-path dialect only
//! compiles SQL for an external PostgreSQL executor; the embedded libsql
//! store runs the prefix-scan dialect.

mod database;
pub mod deep_relation;
pub mod dialect;
mod error;
mod libsql_store;
pub mod path_codec;
pub mod query;
mod tree_store;

pub use database::DatabaseService;
pub use deep_relation::DeepRelation;
pub use dialect::{
    escape_like, Bindings, Dialect, DialectKind, LabelPathDialect, PlaceholderStyle,
    PrefixScanDialect,
};
pub use error::DatabaseError;
pub use libsql_store::{LibsqlTreeStore, LibsqlTreeTransaction};
pub use path_codec::{AttributeValue, PathCodec};
pub use query::{
    key_value, Condition, Connector, DefaultColumns, DepthOperator, SqlStatement, SubtreeRebuild,
    TreeFilter, TreeQuery, WhereGroup,
};
pub use tree_store::{NodeRecord, TreeStore, TreeTransaction};
