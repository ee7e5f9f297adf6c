//! Records and metadata filters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name that addresses a record's source tag instead of its metadata.
pub const SOURCE_FIELD: &str = "source";

/// A record to store: text, vector, source tag and free-form metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    /// Scoping tag used by [`crate::VectorIndex::delete_by_source`].
    pub source: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl IndexRecord {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        embedding: Vec<f32>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            embedding,
            source: source.into(),
            metadata: Map::new(),
        }
    }

    /// Attach a metadata field.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A query hit. `score` is a similarity: higher is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: String,
    pub content: String,
    pub source: String,
    pub metadata: Map<String, Value>,
    pub score: f32,
}

impl ScoredRecord {
    /// Read a string metadata field.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Conjunction of equality conditions on metadata fields.
///
/// The field name `source` matches the record's source tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    conditions: Vec<(String, Value)>,
}

impl MetadataFilter {
    /// A filter that matches everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// Require the source tag to equal `source`.
    pub fn source(self, source: impl Into<String>) -> Self {
        self.eq(SOURCE_FIELD, Value::String(source.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    /// Whether a stored record satisfies every condition.
    pub fn matches(&self, source: &str, metadata: &Map<String, Value>) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            if field == SOURCE_FIELD {
                expected.as_str() == Some(source)
            } else {
                metadata.get(field).unwrap_or(&Value::Null) == expected
            }
        })
    }
}
