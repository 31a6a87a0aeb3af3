//! Data models for RAG operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A primitive metadata value. Notes frontmatter is flattened into these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Integer(i) => write!(f, "{}", i),
            MetadataValue::Float(x) => write!(f, "{}", x),
            MetadataValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Text(s)
    }
}

/// Flat, ordered metadata map attached to documents and chunks.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Metadata key holding the note path relative to the notes folder.
pub const SOURCE_KEY: &str = "source";

/// A loaded note: its plain text and sanitized metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub content: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// The `source` metadata entry, or `"unknown"`.
    pub fn source(&self) -> &str {
        source_of(&self.metadata)
    }
}

/// A chunk of a document, ready for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Index of this chunk within its document (for ordering)
    pub chunk_index: u32,
    /// The text content of the chunk
    pub content: String,
    /// Metadata inherited from the document
    pub metadata: Metadata,
}

impl Chunk {
    pub fn source(&self) -> &str {
        source_of(&self.metadata)
    }
}

fn source_of(metadata: &Metadata) -> &str {
    metadata
        .get(SOURCE_KEY)
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
}

/// Configuration recorded alongside an index so stale embeddings are detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    /// Model identifier (e.g., "text-embedding-3-small")
    pub model: String,
    /// Dimensions of the embedding vectors
    pub dimensions: u32,
}

/// A chunk returned by retrieval, with its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    /// Row id of the chunk in the index
    pub chunk_id: i64,
    pub source: String,
    pub chunk_index: u32,
    pub content: String,
    pub metadata: Metadata,
    /// Cosine similarity to the query (higher is more similar)
    pub score: f32,
}
