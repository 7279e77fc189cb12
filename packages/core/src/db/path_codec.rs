//! Path Column Codec
//!
//! Converts between the raw value stored in the path column and the [`Path`]
//! value type. Reads wrap the stored string with the backend's segment
//! transformer; writes accept only paths and hand back the string to store.

use crate::db::error::DatabaseError;
use crate::models::{Path, PathError, PathPart, SegmentTransformer};
use libsql::Value;
use std::fmt;
use std::sync::Arc;

/// Typed value of a single column, as exchanged with storage.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Integer(i64),
    Text(String),
    Path(Path),
}

impl AttributeValue {
    fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Null => "null",
            AttributeValue::Integer(_) => "integer",
            AttributeValue::Text(_) => "text",
            AttributeValue::Path(_) => "path",
        }
    }
}

impl From<Path> for AttributeValue {
    fn from(path: Path) -> Self {
        AttributeValue::Path(path)
    }
}

impl From<Option<Path>> for AttributeValue {
    fn from(path: Option<Path>) -> Self {
        path.map(AttributeValue::Path).unwrap_or(AttributeValue::Null)
    }
}

impl TryFrom<Value> for AttributeValue {
    type Error = DatabaseError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(AttributeValue::Null),
            Value::Integer(value) => Ok(AttributeValue::Integer(value)),
            Value::Text(value) => Ok(AttributeValue::Text(value)),
            Value::Real(value) => Err(DatabaseError::row_decode(format!(
                "unexpected real value {} in tree column",
                value
            ))),
            Value::Blob(_) => Err(DatabaseError::row_decode(
                "unexpected blob value in tree column",
            )),
        }
    }
}

/// Reads and writes the path column for one tree table.
#[derive(Clone)]
pub struct PathCodec {
    column: String,
    transformer: Arc<dyn SegmentTransformer>,
}

impl PathCodec {
    pub fn new(column: impl Into<String>, transformer: Arc<dyn SegmentTransformer>) -> Self {
        Self {
            column: column.into(),
            transformer,
        }
    }

    pub fn transformer(&self) -> &Arc<dyn SegmentTransformer> {
        &self.transformer
    }

    /// Wrap a stored value; `None` stays `None`.
    pub fn read(&self, stored: Option<&str>) -> Result<Option<Path>, DatabaseError> {
        stored
            .map(|value| Path::parse_with(value, &self.transformer))
            .transpose()
            .map_err(DatabaseError::from)
    }

    /// Read a typed column value.
    pub fn read_attribute(&self, value: &AttributeValue) -> Result<Option<Path>, DatabaseError> {
        match value {
            AttributeValue::Null => Ok(None),
            AttributeValue::Text(text) => self.read(Some(text)),
            AttributeValue::Integer(number) => self.read(Some(&number.to_string())),
            AttributeValue::Path(path) => Ok(Some(path.clone())),
        }
    }

    /// Value to store for `value`.
    ///
    /// Null defers persistence; anything other than a path is rejected. Paths
    /// built with a different transformer are re-encoded with this codec's.
    pub fn write(&self, value: &AttributeValue) -> Result<Option<String>, DatabaseError> {
        match value {
            AttributeValue::Null => Ok(None),
            AttributeValue::Path(path) => self.encode(path).map(Some),
            other => Err(DatabaseError::not_a_path(&self.column, other.type_name())),
        }
    }

    /// Stored string for a path, re-encoding foreign segments.
    pub fn encode(&self, path: &Path) -> Result<String, DatabaseError> {
        if Arc::ptr_eq(path.transformer(), &self.transformer) {
            return Ok(path.as_str().to_string());
        }

        let segments = path.segments();
        let reencoded =
            Path::from_parts_with(segments.iter().map(PathPart::from), &self.transformer)?;
        Ok(reencoded.into_string())
    }

    /// Build a path from parts using this codec's transformer.
    pub fn path_from_parts<'a, I>(&self, parts: I) -> Result<Path, PathError>
    where
        I: IntoIterator<Item = PathPart<'a>>,
    {
        Path::from_parts_with(parts, &self.transformer)
    }
}

impl fmt::Debug for PathCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathCodec")
            .field("column", &self.column)
            .field("transformer", &self.transformer)
            .finish()
    }
}
