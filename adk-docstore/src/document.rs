//! Data types for documents, stored records, and search results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DocStoreError, Result};

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_source() -> String {
    "context".to_string()
}

fn default_title() -> String {
    "Unknown Title".to_string()
}

fn default_published_date() -> String {
    "Unknown Date".to_string()
}

/// Field names of [`DocMetaData`] that may not appear in its `extra` map.
pub const RESERVED_FIELDS: [&str; 7] =
    ["id", "source", "source_content", "title", "published_date", "is_chunk", "window_ids"];

/// Metadata attached to a [`Document`].
///
/// The well-known fields are typed; anything else the caller attaches lives in
/// [`extra`](Self::extra) and is flattened into the same JSON object when the
/// metadata is stored.
///
/// `id`, `source`, `source_content`, `title` and `published_date` must never be
/// empty. Deserialization enforces this; code that mutates the public fields
/// directly is checked again by [`validate`](Self::validate) before any write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawDocMetaData")]
pub struct DocMetaData {
    /// Document identity. Replaced by a derived id when the document is stored.
    pub id: String,
    /// Short reference to where the document came from.
    pub source: String,
    /// Reference plus content of the source.
    pub source_content: String,
    /// Human-readable title.
    pub title: String,
    /// Publication date as free-form text.
    pub published_date: String,
    /// Whether this document is already a chunk of a larger one.
    pub is_chunk: bool,
    /// Ids of neighboring chunks, in document order.
    pub window_ids: Vec<String>,
    /// Caller-defined fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawDocMetaData {
    #[serde(default = "new_id")]
    id: String,
    #[serde(default = "default_source")]
    source: String,
    #[serde(default = "default_source")]
    source_content: String,
    #[serde(default = "default_title")]
    title: String,
    #[serde(default = "default_published_date")]
    published_date: String,
    #[serde(default)]
    is_chunk: bool,
    #[serde(default)]
    window_ids: Vec<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

// The bare message is surfaced by `from_value` as a single validation error.
impl TryFrom<RawDocMetaData> for DocMetaData {
    type Error = String;

    fn try_from(raw: RawDocMetaData) -> std::result::Result<Self, String> {
        let metadata = Self {
            id: raw.id,
            source: raw.source,
            source_content: raw.source_content,
            title: raw.title,
            published_date: raw.published_date,
            is_chunk: raw.is_chunk,
            window_ids: raw.window_ids,
            extra: raw.extra,
        };
        match metadata.problem() {
            Some(problem) => Err(problem),
            None => Ok(metadata),
        }
    }
}

impl Default for DocMetaData {
    fn default() -> Self {
        Self {
            id: new_id(),
            source: default_source(),
            source_content: default_source(),
            title: default_title(),
            published_date: default_published_date(),
            is_chunk: false,
            window_ids: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl DocMetaData {
    /// Create metadata with the given source and defaults for everything else.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        Self { source_content: source.clone(), source, ..Self::default() }
    }

    /// Set the document id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Attach a caller-defined field.
    ///
    /// Keys that name a typed field (see [`RESERVED_FIELDS`]) are rejected by
    /// [`validate`](Self::validate).
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Check that none of the required string fields is empty and that
    /// [`extra`](Self::extra) does not shadow a typed field.
    ///
    /// # Errors
    ///
    /// Returns [`DocStoreError::ValidationError`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        match self.problem() {
            Some(problem) => Err(DocStoreError::ValidationError(problem)),
            None => Ok(()),
        }
    }

    fn problem(&self) -> Option<String> {
        let required = [
            ("id", &self.id),
            ("source", &self.source),
            ("source_content", &self.source_content),
            ("title", &self.title),
            ("published_date", &self.published_date),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Some(format!("metadata field '{field}' cannot be empty"));
        }
        self.extra
            .keys()
            .find(|key| RESERVED_FIELDS.contains(&key.as_str()))
            .map(|key| format!("extra field '{key}' shadows a metadata field"))
    }

    /// Serialize to a JSON object with caller fields merged in.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Parse metadata from a JSON object, applying defaults and validation.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| DocStoreError::ValidationError(e.to_string()))
    }
}

/// A text document with its metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// The text content of the document.
    pub content: String,
    /// Metadata associated with the document.
    pub metadata: DocMetaData,
}

impl Document {
    /// Create a document from content and metadata.
    pub fn new(content: impl Into<String>, metadata: DocMetaData) -> Self {
        Self { content: content.into(), metadata }
    }

    /// Create a document from raw text with default metadata.
    pub fn from_string(
        content: impl Into<String>,
        source: impl Into<String>,
        is_chunk: bool,
    ) -> Self {
        let metadata = DocMetaData { is_chunk, ..DocMetaData::new(source) };
        Self::new(content, metadata)
    }

    /// The document's identity.
    pub fn id(&self) -> &str {
        &self.metadata.id
    }
}

/// The physical row a backend persists for each document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    /// Primary key; the derived document id.
    pub id: String,
    /// The embedding of `content`. Read paths may leave this empty.
    pub embedding: Vec<f32>,
    /// The document text.
    pub content: String,
    /// The document metadata as a JSON object.
    pub metadata: Value,
}

impl StoredRecord {
    /// Convert the row back into a [`Document`].
    ///
    /// The metadata's `id` is always taken from the row's primary key.
    ///
    /// # Errors
    ///
    /// Returns [`DocStoreError::VectorStoreError`] if the stored metadata is not a valid
    /// metadata object.
    pub fn into_document(self, backend: &str) -> Result<Document> {
        let mut metadata = match self.metadata {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(DocStoreError::backend(
                    backend,
                    format!("record '{}' has non-object metadata: {other}", self.id),
                ));
            }
        };
        metadata.insert("id".to_string(), Value::String(self.id.clone()));
        let metadata = DocMetaData::from_value(Value::Object(metadata)).map_err(|e| {
            DocStoreError::backend(backend, format!("record '{}' has bad metadata: {e}", self.id))
        })?;
        Ok(Document { content: self.content, metadata })
    }
}

/// A retrieved [`Document`] paired with a similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved document.
    pub document: Document,
    /// The similarity score (higher is more similar).
    pub score: f32,
}
