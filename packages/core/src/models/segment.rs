//! Path Segment Transformers
//!
//! Some storage types restrict which characters a path label may contain. The
//! PostgreSQL `ltree` type, for instance, only accepts alphanumerics and
//! underscores, so UUID keys (`5d1c…-…`) cannot be stored verbatim.
//!
//! A [`SegmentTransformer`] encodes every raw segment before it becomes part of a
//! stored path and decodes it again when segments are read back. Encoding and
//! decoding must be mutual inverses for every segment the encoder accepts.

use crate::models::path::PathError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// Encode/decode pair applied to individual path segments.
pub trait SegmentTransformer: Send + Sync + fmt::Debug {
    /// Transform a raw segment into its stored form.
    fn encode(&self, segment: &str) -> Result<String, PathError>;

    /// Restore a stored segment into its raw form.
    fn decode(&self, segment: &str) -> String;
}

/// Leaves segments untouched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IdentityTransformer;

impl SegmentTransformer for IdentityTransformer {
    fn encode(&self, segment: &str) -> Result<String, PathError> {
        Ok(segment.to_string())
    }

    fn decode(&self, segment: &str) -> String {
        segment.to_string()
    }
}

/// Replaces dashes with underscores so UUID segments fit a label-path type.
///
/// A raw segment holding both characters could not be restored unambiguously,
/// so encoding rejects it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UuidLabelTransformer;

impl UuidLabelTransformer {
    const RAW: char = '-';
    const STORED: char = '_';
}

impl SegmentTransformer for UuidLabelTransformer {
    fn encode(&self, segment: &str) -> Result<String, PathError> {
        if segment.contains(Self::RAW) && segment.contains(Self::STORED) {
            return Err(PathError::ambiguous_segment(segment, Self::RAW, Self::STORED));
        }

        Ok(segment.replace(Self::RAW, &Self::STORED.to_string()))
    }

    fn decode(&self, segment: &str) -> String {
        segment.replace(Self::STORED, &Self::RAW.to_string())
    }
}

/// Applies several transformers in sequence.
///
/// Encoding runs front to back, decoding back to front.
#[derive(Debug, Default, Clone)]
pub struct TransformerChain {
    transformers: Vec<Arc<dyn SegmentTransformer>>,
}

impl TransformerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, transformer: Arc<dyn SegmentTransformer>) -> Self {
        self.transformers.push(transformer);
        self
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

impl SegmentTransformer for TransformerChain {
    fn encode(&self, segment: &str) -> Result<String, PathError> {
        self.transformers
            .iter()
            .try_fold(segment.to_string(), |acc, t| t.encode(&acc))
    }

    fn decode(&self, segment: &str) -> String {
        self.transformers
            .iter()
            .rev()
            .fold(segment.to_string(), |acc, t| t.decode(&acc))
    }
}

/// Shared identity transformer used by paths built without an explicit encoding.
pub fn identity_transformer() -> Arc<dyn SegmentTransformer> {
    static IDENTITY: OnceLock<Arc<dyn SegmentTransformer>> = OnceLock::new();
    IDENTITY
        .get_or_init(|| Arc::new(IdentityTransformer))
        .clone()
}

/// Named built-in encodings, selectable from configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentEncoding {
    #[default]
    Identity,
    UuidLabel,
}

impl SegmentEncoding {
    pub fn transformer(&self) -> Arc<dyn SegmentTransformer> {
        match self {
            SegmentEncoding::Identity => identity_transformer(),
            SegmentEncoding::UuidLabel => Arc::new(UuidLabelTransformer),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentEncoding::Identity => "identity",
            SegmentEncoding::UuidLabel => "uuid_label",
        }
    }
}

impl FromStr for SegmentEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "identity" | "none" => Ok(SegmentEncoding::Identity),
            "uuid_label" | "uuid" => Ok(SegmentEncoding::UuidLabel),
            other => Err(format!("Unknown segment encoding: {}", other)),
        }
    }
}

impl fmt::Display for SegmentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
