//! Backend Dialects
//!
//! A [`Dialect`] renders tree predicates into backend-native SQL fragments.
//! Two dialects are built in:
//!
//! - [`LabelPathDialect`] targets a hierarchical label type (PostgreSQL `ltree`)
//!   and uses its containment operators (`@>`, `<@`) and `nlevel`/`subpath`
//! - [`PrefixScanDialect`] targets a plain text column and emulates containment
//!   with an `IN` list over all prefixes and an escaped `LIKE 'path.%'` scan
//!
//! Both must select the same rows for the same set of stored paths. Fragments
//! push their bind values into a shared [`Bindings`] so placeholders come out
//! in the style the backend expects (`?` or `$n`).

use crate::db::error::DatabaseError;
use crate::models::{Path, SegmentEncoding, SEPARATOR};
use libsql::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Escape character used in `LIKE ... ESCAPE` clauses.
const LIKE_ESCAPE: char = '\\';

/// How bind placeholders are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` for every parameter (SQLite/libsql)
    Positional,
    /// `$1`, `$2`, ... (PostgreSQL)
    Numbered,
}

/// Bind parameters collected while compiling a statement.
#[derive(Debug, Clone)]
pub struct Bindings {
    style: PlaceholderStyle,
    params: Vec<Value>,
}

impl Bindings {
    pub fn new(style: PlaceholderStyle) -> Self {
        Self {
            style,
            params: Vec::new(),
        }
    }

    /// Record `value` and return the placeholder referring to it.
    pub fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        match self.style {
            PlaceholderStyle::Positional => "?".to_string(),
            PlaceholderStyle::Numbered => format!("${}", self.params.len()),
        }
    }

    pub fn bind_text(&mut self, value: impl Into<String>) -> String {
        self.bind(Value::Text(value.into()))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn into_params(self) -> Vec<Value> {
        self.params
    }
}

/// SQL fragment compiler for one backend.
///
/// Every operation defaults to [`DatabaseError::UnsupportedBackend`], so a
/// dialect only implements what its backend can express.
pub trait Dialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Segment encoding used when the configuration does not name one.
    fn default_encoding(&self) -> SegmentEncoding {
        SegmentEncoding::Identity
    }

    /// Rows whose `column` is `path` or one of its ancestors.
    fn self_or_ancestor(
        &self,
        _column: &str,
        _path: &Path,
        _bindings: &mut Bindings,
    ) -> Result<String, DatabaseError> {
        Err(self.unsupported("self-or-ancestor predicates"))
    }

    /// Rows whose `column` is `path` or one of its descendants.
    fn self_or_descendant(
        &self,
        _column: &str,
        _path: &Path,
        _bindings: &mut Bindings,
    ) -> Result<String, DatabaseError> {
        Err(self.unsupported("self-or-descendant predicates"))
    }

    /// Expression evaluating to the number of segments in `column`.
    fn depth(&self, _column: &str) -> Result<String, DatabaseError> {
        Err(self.unsupported("depth expressions"))
    }

    /// Expression computing the relocated value of `column` for a row in the
    /// subtree of `old_path`, placing it under `new_parent` (or at the root).
    fn rebuild_path(
        &self,
        _column: &str,
        _old_path: &Path,
        _new_parent: Option<&Path>,
        _bindings: &mut Bindings,
    ) -> Result<String, DatabaseError> {
        Err(self.unsupported("subtree path rebuilds"))
    }

    fn unsupported(&self, operation: &str) -> DatabaseError {
        DatabaseError::unsupported_backend(self.name(), operation)
    }
}

/// Hierarchical label-path type (`ltree`).
#[derive(Debug, Default, Clone, Copy)]
pub struct LabelPathDialect;

impl Dialect for LabelPathDialect {
    fn name(&self) -> &'static str {
        DialectKind::LabelPath.as_str()
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Numbered
    }

    fn default_encoding(&self) -> SegmentEncoding {
        SegmentEncoding::UuidLabel
    }

    fn self_or_ancestor(
        &self,
        column: &str,
        path: &Path,
        bindings: &mut Bindings,
    ) -> Result<String, DatabaseError> {
        let placeholder = bindings.bind_text(path.as_str());
        Ok(format!("{} @> {}::ltree", column, placeholder))
    }

    fn self_or_descendant(
        &self,
        column: &str,
        path: &Path,
        bindings: &mut Bindings,
    ) -> Result<String, DatabaseError> {
        let placeholder = bindings.bind_text(path.as_str());
        Ok(format!("{} <@ {}::ltree", column, placeholder))
    }

    fn depth(&self, column: &str) -> Result<String, DatabaseError> {
        Ok(format!("nlevel({})", column))
    }

    fn rebuild_path(
        &self,
        column: &str,
        old_path: &Path,
        new_parent: Option<&Path>,
        bindings: &mut Bindings,
    ) -> Result<String, DatabaseError> {
        // subpath offsets are 0-based label counts
        let offset = old_path.depth() - 1;

        Ok(match new_parent {
            Some(parent) => {
                let placeholder = bindings.bind_text(parent.as_str());
                format!(
                    "{}::ltree || subpath({}, {})",
                    placeholder, column, offset
                )
            }
            None => format!("subpath({}, {})", column, offset),
        })
    }
}

/// Plain text column scanned by prefix.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrefixScanDialect;

impl Dialect for PrefixScanDialect {
    fn name(&self) -> &'static str {
        DialectKind::PrefixScan.as_str()
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Positional
    }

    fn self_or_ancestor(
        &self,
        column: &str,
        path: &Path,
        bindings: &mut Bindings,
    ) -> Result<String, DatabaseError> {
        let placeholders: Vec<String> = path
            .self_or_ancestor_paths()
            .into_iter()
            .map(|prefix| bindings.bind_text(prefix))
            .collect();

        Ok(format!("{} IN ({})", column, placeholders.join(", ")))
    }

    fn self_or_descendant(
        &self,
        column: &str,
        path: &Path,
        bindings: &mut Bindings,
    ) -> Result<String, DatabaseError> {
        let exact = bindings.bind_text(path.as_str());
        let pattern = bindings.bind_text(format!(
            "{}{}%",
            escape_like(path.as_str()),
            SEPARATOR
        ));

        Ok(format!(
            "({} = {} OR {} LIKE {} ESCAPE '{}')",
            column, exact, column, pattern, LIKE_ESCAPE
        ))
    }

    fn depth(&self, column: &str) -> Result<String, DatabaseError> {
        Ok(format!(
            "((length({col}) - length(replace({col}, '{sep}', ''))) + 1)",
            col = column,
            sep = SEPARATOR
        ))
    }

    fn rebuild_path(
        &self,
        column: &str,
        old_path: &Path,
        new_parent: Option<&Path>,
        bindings: &mut Bindings,
    ) -> Result<String, DatabaseError> {
        // 1-based position of the node's own segment inside every subtree value
        let start = old_path
            .parent()
            .map(|parent| parent.as_str().chars().count() + 2)
            .unwrap_or(1);

        Ok(match new_parent {
            Some(parent) => {
                let placeholder = bindings.bind_text(format!("{}{}", parent.as_str(), SEPARATOR));
                format!("{} || substr({}, {})", placeholder, column, start)
            }
            None => format!("substr({}, {})", column, start),
        })
    }
}

/// Escape `LIKE` metacharacters so a stored path matches literally.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == LIKE_ESCAPE || ch == '%' || ch == '_' {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(ch);
    }
    escaped
}

/// Built-in dialect selector used by configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    LabelPath,
    #[default]
    PrefixScan,
}

impl DialectKind {
    pub fn dialect(&self) -> Arc<dyn Dialect> {
        match self {
            DialectKind::LabelPath => Arc::new(LabelPathDialect),
            DialectKind::PrefixScan => Arc::new(PrefixScanDialect),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::LabelPath => "label_path",
            DialectKind::PrefixScan => "prefix_scan",
        }
    }
}

impl FromStr for DialectKind {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "label_path" | "ltree" | "pgsql" | "postgres" => Ok(DialectKind::LabelPath),
            "prefix_scan" | "sqlite" | "libsql" | "like" => Ok(DialectKind::PrefixScan),
            other => Err(DatabaseError::unsupported_backend(other, "tree queries")),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
