//! Materialized Path Value Type
//!
//! A [`Path`] encodes a node's position in the tree as the dot-separated list of
//! its ancestors' path source values followed by its own, e.g. `1.2.3` for a node
//! `3` whose parent is `2` whose parent is the root `1`.
//!
//! The value held by a `Path` is always the *stored* form: every segment has been
//! passed through the path's [`SegmentTransformer`]. [`Path::segments`] decodes
//! them back into raw values.
//!
//! # Examples
//!
//! ```rust
//! use pathtree_core::models::{Path, PathPart};
//!
//! let root = Path::from_segments(["1"]).unwrap();
//! let child = Path::from_parts([PathPart::from(&root), PathPart::from("2")]).unwrap();
//!
//! assert_eq!(child.as_str(), "1.2");
//! assert_eq!(child.depth(), 2);
//! assert_eq!(child.ancestor_segments(), vec!["1".to_string()]);
//! ```

use crate::models::segment::{identity_transformer, SegmentTransformer};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Separator between path segments.
pub const SEPARATOR: char = '.';

/// Invalid path construction or encoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Path must contain at least one segment")]
    Empty,

    #[error("Path '{value}' contains an empty segment")]
    EmptySegment { value: String },

    #[error("Path segment '{segment}' must not contain the separator '.'")]
    SeparatorInSegment { segment: String },

    #[error("Path segment '{segment}' cannot contain both '{first}' and '{second}'")]
    AmbiguousSegment {
        segment: String,
        first: char,
        second: char,
    },
}

impl PathError {
    pub fn empty_segment(value: impl Into<String>) -> Self {
        Self::EmptySegment {
            value: value.into(),
        }
    }

    pub fn separator_in_segment(segment: impl Into<String>) -> Self {
        Self::SeparatorInSegment {
            segment: segment.into(),
        }
    }

    pub fn ambiguous_segment(segment: impl Into<String>, first: char, second: char) -> Self {
        Self::AmbiguousSegment {
            segment: segment.into(),
            first,
            second,
        }
    }
}

/// A single argument to [`Path::from_parts`].
///
/// Raw parts are encoded through the transformer; existing paths contribute
/// their stored value unchanged.
#[derive(Debug, Clone, Copy)]
pub enum PathPart<'a> {
    Path(&'a Path),
    Raw(&'a str),
}

impl<'a> From<&'a Path> for PathPart<'a> {
    fn from(path: &'a Path) -> Self {
        PathPart::Path(path)
    }
}

impl<'a> From<&'a str> for PathPart<'a> {
    fn from(raw: &'a str) -> Self {
        PathPart::Raw(raw)
    }
}

impl<'a> From<&'a String> for PathPart<'a> {
    fn from(raw: &'a String) -> Self {
        PathPart::Raw(raw.as_str())
    }
}

/// Immutable materialized path.
///
/// Equality, ordering and hashing consider the stored value only.
#[derive(Clone)]
pub struct Path {
    value: String,
    transformer: Arc<dyn SegmentTransformer>,
}

impl Path {
    /// Build a path by concatenating parts with the identity encoding.
    pub fn from_parts<'a, I>(parts: I) -> Result<Path, PathError>
    where
        I: IntoIterator<Item = PathPart<'a>>,
    {
        Self::from_parts_with(parts, &identity_transformer())
    }

    /// Build a path by concatenating parts, encoding raw parts with `transformer`.
    pub fn from_parts_with<'a, I>(
        parts: I,
        transformer: &Arc<dyn SegmentTransformer>,
    ) -> Result<Path, PathError>
    where
        I: IntoIterator<Item = PathPart<'a>>,
    {
        let mut stored: Vec<String> = Vec::new();

        for part in parts {
            match part {
                PathPart::Path(path) => stored.push(path.value.clone()),
                PathPart::Raw(raw) => {
                    if raw.is_empty() {
                        return Err(PathError::empty_segment(raw));
                    }
                    if raw.contains(SEPARATOR) {
                        return Err(PathError::separator_in_segment(raw));
                    }
                    let encoded = transformer.encode(raw)?;
                    if encoded.is_empty() || encoded.contains(SEPARATOR) {
                        return Err(PathError::separator_in_segment(encoded));
                    }
                    stored.push(encoded);
                }
            }
        }

        if stored.is_empty() {
            return Err(PathError::Empty);
        }

        Ok(Path {
            value: stored.join(&SEPARATOR.to_string()),
            transformer: transformer.clone(),
        })
    }

    /// Build a path from raw segments with the identity encoding.
    pub fn from_segments<I, S>(segments: I) -> Result<Path, PathError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let owned: Vec<S> = segments.into_iter().collect();
        Self::from_parts(owned.iter().map(|s| PathPart::Raw(s.as_ref())))
    }

    /// Parse a stored path with the identity encoding.
    pub fn parse(stored: &str) -> Result<Path, PathError> {
        Self::parse_with(stored, &identity_transformer())
    }

    /// Parse a stored path whose segments were encoded by `transformer`.
    pub fn parse_with(
        stored: &str,
        transformer: &Arc<dyn SegmentTransformer>,
    ) -> Result<Path, PathError> {
        if stored.is_empty() {
            return Err(PathError::Empty);
        }
        if stored.split(SEPARATOR).any(str::is_empty) {
            return Err(PathError::empty_segment(stored));
        }

        Ok(Path {
            value: stored.to_string(),
            transformer: transformer.clone(),
        })
    }

    /// Append a raw segment, encoded with this path's transformer.
    pub fn child(&self, raw: &str) -> Result<Path, PathError> {
        Self::from_parts_with([PathPart::Path(self), PathPart::Raw(raw)], &self.transformer)
    }

    /// The stored value.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }

    pub fn transformer(&self) -> &Arc<dyn SegmentTransformer> {
        &self.transformer
    }

    /// Stored (encoded) segments.
    pub fn raw_segments(&self) -> impl Iterator<Item = &str> {
        self.value.split(SEPARATOR)
    }

    /// Decoded segments, root first.
    pub fn segments(&self) -> Vec<String> {
        self.raw_segments()
            .map(|segment| self.transformer.decode(segment))
            .collect()
    }

    pub fn depth(&self) -> usize {
        self.raw_segments().count()
    }

    /// Decoded segments of every ancestor, excluding the last segment.
    pub fn ancestor_segments(&self) -> Vec<String> {
        let mut segments = self.segments();
        segments.pop();
        segments
    }

    /// The decoded last segment, i.e. the owning node's path source value.
    pub fn last_segment(&self) -> String {
        let last = self.value.rsplit(SEPARATOR).next().unwrap_or(&self.value);
        self.transformer.decode(last)
    }

    /// Whether any segment decodes to `source`.
    pub fn contains_source(&self, source: &str) -> bool {
        self.raw_segments()
            .any(|segment| self.transformer.decode(segment) == source)
    }

    /// The path with its last segment removed, or `None` for a depth-1 path.
    pub fn parent(&self) -> Option<Path> {
        self.value.rfind(SEPARATOR).map(|index| Path {
            value: self.value[..index].to_string(),
            transformer: self.transformer.clone(),
        })
    }

    /// Stored values of every self-or-ancestor path.
    ///
    /// `1.2.3` yields `["1", "1.2", "1.2.3"]`.
    pub fn self_or_ancestor_paths(&self) -> Vec<String> {
        let mut output = Vec::with_capacity(self.depth());
        let mut current = String::with_capacity(self.value.len());

        for (index, segment) in self.raw_segments().enumerate() {
            if index > 0 {
                current.push(SEPARATOR);
            }
            current.push_str(segment);
            output.push(current.clone());
        }

        output
    }

    /// Stored values of every strict ancestor path.
    pub fn ancestor_paths(&self) -> Vec<String> {
        let mut output = self.self_or_ancestor_paths();
        output.pop();
        output
    }

    /// Whether this path equals `other` or is a segment-wise prefix of it.
    pub fn is_self_or_ancestor_of(&self, other: &Path) -> bool {
        other.value == self.value
            || (other.value.starts_with(&self.value)
                && other.value[self.value.len()..].starts_with(SEPARATOR))
    }

    pub fn is_self_or_descendant_of(&self, other: &Path) -> bool {
        other.is_self_or_ancestor_of(self)
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Path").field(&self.value).finish()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Path::parse(&value).map_err(serde::de::Error::custom)
    }
}
