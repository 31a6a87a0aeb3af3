//! Vector index for semantic search using SQLite.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use super::models::{Chunk, EmbeddingConfig, Metadata, RetrievedChunk};

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chunk count ({chunks}) doesn't match embedding count ({embeddings})")]
    CountMismatch { chunks: usize, embeddings: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: u32, actual: u32 },

    #[error("Embedding model mismatch: index uses '{expected}', got '{actual}'")]
    ModelMismatch { expected: String, actual: String },
}

pub type Result<T> = std::result::Result<T, VectorIndexError>;

/// A stored chunk together with its embedding.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: i64,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Vector index over note chunks.
///
/// Embeddings are stored as little-endian f32 blobs and searched by
/// brute-force cosine similarity, which is plenty for a personal notes
/// collection.
pub struct VectorIndex {
    conn: Connection,
    config: Option<EmbeddingConfig>,
}

impl VectorIndex {
    /// Open (or create) a vector index at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    /// Open a throwaway in-memory index.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS embeddings (
                chunk_id INTEGER PRIMARY KEY,
                embedding BLOB NOT NULL,
                dimensions INTEGER NOT NULL,
                FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);
            "#,
        )?;

        let config: Option<EmbeddingConfig> = conn
            .query_row(
                "SELECT value FROM config WHERE key = 'embedding_config'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|s| serde_json::from_str(&s).ok());

        Ok(Self { conn, config })
    }

    pub fn embedding_model(&self) -> Option<&str> {
        self.config.as_ref().map(|c| c.model.as_str())
    }

    /// Clear all chunks, embeddings and the recorded embedding config.
    pub fn rebuild(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM embeddings", [])?;
        tx.execute("DELETE FROM chunks", [])?;
        tx.execute("DELETE FROM config", [])?;

        tx.commit()?;
        self.config = None;
        Ok(())
    }

    /// Store chunks with their pre-computed embeddings in one transaction.
    ///
    /// The first batch added to an empty index records the model and
    /// dimensions; later batches must match them.
    pub fn add_chunks(&mut self, model: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(VectorIndexError::CountMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }
        let Some(first) = embeddings.first() else {
            return Ok(());
        };

        let config = match &self.config {
            Some(config) if config.model != model => {
                return Err(VectorIndexError::ModelMismatch {
                    expected: config.model.clone(),
                    actual: model.to_string(),
                });
            }
            Some(config) => config.clone(),
            None => EmbeddingConfig {
                model: model.to_string(),
                dimensions: first.len() as u32,
            },
        };

        for emb in embeddings {
            if emb.len() as u32 != config.dimensions {
                return Err(VectorIndexError::DimensionMismatch {
                    expected: config.dimensions,
                    actual: emb.len() as u32,
                });
            }
        }

        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO config (key, value) VALUES ('embedding_config', ?1)",
            params![serde_json::to_string(&config)?],
        )?;

        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            let metadata_json = serde_json::to_string(&chunk.metadata)?;

            tx.execute(
                "INSERT INTO chunks (source, chunk_index, content, metadata) VALUES (?1, ?2, ?3, ?4)",
                params![chunk.source(), chunk.chunk_index, chunk.content, metadata_json],
            )?;
            let chunk_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO embeddings (chunk_id, embedding, dimensions) VALUES (?1, ?2, ?3)",
                params![chunk_id, serialize_embedding(embedding), embedding.len() as i64],
            )?;
        }

        tx.commit()?;
        self.config = Some(config);
        Ok(())
    }

    /// Every stored chunk with its embedding, in insertion order.
    pub fn all_entries(&self) -> Result<Vec<IndexEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT c.id, c.chunk_index, c.content, c.metadata, e.embedding
            FROM chunks c
            JOIN embeddings e ON c.id = e.chunk_id
            ORDER BY c.id
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Vec<u8>>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, chunk_index, content, metadata_json, embedding_bytes)| {
                let metadata: Metadata = serde_json::from_str(&metadata_json)?;
                Ok(IndexEntry {
                    id,
                    chunk: Chunk {
                        chunk_index,
                        content,
                        metadata,
                    },
                    embedding: deserialize_embedding(&embedding_bytes),
                })
            })
            .collect()
    }

    /// Score every stored chunk against a query embedding, best first.
    pub fn scored_entries(&self, query_embedding: &[f32]) -> Result<Vec<(f32, IndexEntry)>> {
        if let Some(config) = &self.config {
            if query_embedding.len() as u32 != config.dimensions {
                return Err(VectorIndexError::DimensionMismatch {
                    expected: config.dimensions,
                    actual: query_embedding.len() as u32,
                });
            }
        }

        let mut scored: Vec<(f32, IndexEntry)> = self
            .all_entries()?
            .into_iter()
            .map(|entry| (cosine_similarity(query_embedding, &entry.embedding), entry))
            .collect();

        // Sort by score descending with NaN last; stable so ties keep insertion order
        let rank = |score: f32| if score.is_nan() { f32::NEG_INFINITY } else { score };
        scored.sort_by(|a, b| rank(b.0).total_cmp(&rank(a.0)));
        Ok(scored)
    }

    /// Search for the `limit` chunks most similar to a query embedding.
    pub fn similarity_search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<RetrievedChunk>> {
        Ok(self
            .scored_entries(query_embedding)?
            .into_iter()
            .take(limit)
            .map(|(score, entry)| entry.into_retrieved(score))
            .collect())
    }

    /// Get statistics about the index.
    pub fn stats(&self) -> Result<IndexStats> {
        let chunk_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;

        let source_count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT source) FROM chunks",
            [],
            |row| row.get(0),
        )?;

        Ok(IndexStats {
            chunk_count: chunk_count as u64,
            source_count: source_count as u64,
            model: self.config.as_ref().map(|c| c.model.clone()),
            dimensions: self.config.as_ref().map(|c| c.dimensions).unwrap_or(0),
        })
    }
}

impl IndexEntry {
    pub fn into_retrieved(self, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: self.id,
            source: self.chunk.source().to_string(),
            chunk_index: self.chunk.chunk_index,
            content: self.chunk.content,
            metadata: self.chunk.metadata,
            score,
        }
    }
}

/// Statistics about the vector index.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub chunk_count: u64,
    pub source_count: u64,
    pub model: Option<String>,
    pub dimensions: u32,
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize embedding from binary blob.
fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }

    dot_product / denominator
}
