//! Tree Table Configuration
//!
//! [`TreeConfig`] names the table and columns a tree lives in, how keys are
//! generated, which value becomes each node's path segment, and which backend
//! dialect compiles its queries.
//!
//! ```rust
//! use pathtree_core::{DialectKind, KeyStrategy, PathSource, TreeConfig};
//!
//! let config = TreeConfig::new("categories")
//!     .with_path_source(PathSource::Column("slug".to_string()))
//!     .with_key_strategy(KeyStrategy::Uuid);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.dialect, DialectKind::PrefixScan);
//! ```

use crate::db::{DatabaseError, DialectKind};
use crate::models::{SegmentEncoding, SegmentTransformer};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// Value used as a node's own path segment.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSource {
    /// The primary key
    #[default]
    Key,
    /// A separate unique, stable column
    Column(String),
}

/// How primary keys are produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Integer key assigned by the backend on insert
    #[default]
    AutoIncrement,
    /// UUID v4 generated before insert
    Uuid,
}

/// Configuration for one tree table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Table holding the tree rows
    pub table: String,

    /// Primary key column
    pub key_column: String,

    /// Self-referencing parent column
    pub parent_column: String,

    /// Materialized path column
    pub path_column: String,

    /// Source of each node's path segment
    pub path_source: PathSource,

    /// Primary key generation
    pub key_strategy: KeyStrategy,

    /// Backend dialect used to compile tree predicates
    pub dialect: DialectKind,

    /// Segment encoding; the dialect's default when unset
    pub segment_encoding: Option<SegmentEncoding>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            table: "tree_nodes".to_string(),
            key_column: "id".to_string(),
            parent_column: "parent_id".to_string(),
            path_column: "path".to_string(),
            path_source: PathSource::Key,
            key_strategy: KeyStrategy::AutoIncrement,
            dialect: DialectKind::PrefixScan,
            segment_encoding: None,
        }
    }
}

impl TreeConfig {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn with_path_source(mut self, path_source: PathSource) -> Self {
        self.path_source = path_source;
        self
    }

    pub fn with_key_strategy(mut self, key_strategy: KeyStrategy) -> Self {
        self.key_strategy = key_strategy;
        self
    }

    pub fn with_dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_segment_encoding(mut self, encoding: SegmentEncoding) -> Self {
        self.segment_encoding = Some(encoding);
        self
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, DatabaseError> {
        let config: TreeConfig = serde_json::from_str(json)?;
        config.validate().map_err(DatabaseError::invalid_config)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let mut columns = vec![
            ("table", self.table.as_str()),
            ("key_column", self.key_column.as_str()),
            ("parent_column", self.parent_column.as_str()),
            ("path_column", self.path_column.as_str()),
        ];
        if let PathSource::Column(column) = &self.path_source {
            columns.push(("path_source", column.as_str()));
        }

        for (field, value) in &columns {
            if !is_identifier(value) {
                return Err(format!("{} '{}' is not a valid SQL identifier", field, value));
            }
        }

        let names = &columns[1..];
        for (index, (field, value)) in names.iter().enumerate() {
            if let Some((other, _)) = names[index + 1..].iter().find(|(_, v)| v == value) {
                return Err(format!("{} and {} both use column '{}'", field, other, value));
            }
        }

        Ok(())
    }

    /// The custom path source column, if any.
    pub fn source_column(&self) -> Option<&str> {
        match &self.path_source {
            PathSource::Key => None,
            PathSource::Column(column) => Some(column.as_str()),
        }
    }

    /// Effective segment encoding.
    pub fn segment_encoding(&self) -> SegmentEncoding {
        self.segment_encoding
            .unwrap_or_else(|| self.dialect.dialect().default_encoding())
    }

    pub fn transformer(&self) -> Arc<dyn SegmentTransformer> {
        self.segment_encoding().transformer()
    }

    /// `table.column`
    pub fn qualified(&self, column: &str) -> String {
        format!("{}.{}", self.table, column)
    }
}

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";
static IDENTIFIER_REGEX: OnceLock<Regex> = OnceLock::new();

/// Whether `value` can be spliced into SQL as a bare identifier.
pub fn is_identifier(value: &str) -> bool {
    let regex = IDENTIFIER_REGEX.get_or_init(|| Regex::new(IDENTIFIER_PATTERN).unwrap());
    regex.is_match(value)
}
