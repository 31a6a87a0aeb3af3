//! Reuse a persisted index while the notes are unchanged, rebuild otherwise.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::chunker::estimate_tokens;
use super::embeddings::{EmbeddingError, EmbeddingProvider};
use super::index::{VectorIndex, VectorIndexError};
use super::models::Chunk;

/// Chunks are embedded in groups this size so progress shows up in the log.
const EMBED_GROUP_SIZE: usize = 256;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Vector index error: {0}")]
    Index(#[from] VectorIndexError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Why the index was or wasn't rebuilt.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOutcome {
    Reused,
    Rebuilt { reason: RebuildReason },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RebuildReason {
    NoIndex,
    NoHashFile,
    NotesChanged,
    ModelChanged { previous: Option<String> },
    OpenFailed(String),
    Forced,
}

impl std::fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RebuildReason::NoIndex => f.write_str("no existing vector store"),
            RebuildReason::NoHashFile => f.write_str("no hash file found"),
            RebuildReason::NotesChanged => f.write_str("notes have changed"),
            RebuildReason::ModelChanged { previous } => write!(
                f,
                "embedding model changed (was {})",
                previous.as_deref().unwrap_or("unknown")
            ),
            RebuildReason::OpenFailed(e) => write!(f, "existing vector store unreadable: {}", e),
            RebuildReason::Forced => f.write_str("rebuild requested"),
        }
    }
}

/// SHA-256 over the chunk contents in order, as lowercase hex.
pub fn documents_hash(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.content.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Path of the companion file holding the notes hash for an index.
pub fn hash_file_path(index_path: &Path) -> PathBuf {
    let mut name = index_path.as_os_str().to_os_string();
    name.push(".hash");
    PathBuf::from(name)
}

/// Open the index at `index_path` if it matches the current chunks and
/// embedding model, otherwise clear it and embed everything again.
pub fn load_or_build(
    index_path: &Path,
    chunks: &[Chunk],
    embedder: &dyn EmbeddingProvider,
    force_rebuild: bool,
) -> Result<(VectorIndex, CacheOutcome)> {
    let current_hash = documents_hash(chunks);

    let reason = if force_rebuild {
        RebuildReason::Forced
    } else {
        match try_reuse(index_path, &current_hash, embedder.model_name()) {
            Ok(index) => {
                log::info!("Loaded cached vector store from {}", index_path.display());
                return Ok((index, CacheOutcome::Reused));
            }
            Err(reason) => reason,
        }
    };

    log::info!("Building new vector store: {}", reason);

    let mut index = match VectorIndex::open(index_path) {
        Ok(index) => index,
        Err(VectorIndexError::Sqlite(e)) => {
            // Not a usable database; start over from an empty file
            log::warn!("Replacing unreadable vector store {}: {}", index_path.display(), e);
            fs::remove_file(index_path)?;
            VectorIndex::open(index_path)?
        }
        Err(e) => return Err(e.into()),
    };

    // Drop the old hash first so a failed build is never mistaken for a valid cache
    let hash_path = hash_file_path(index_path);
    if hash_path.exists() {
        fs::remove_file(&hash_path)?;
    }

    build_index(&mut index, chunks, embedder)?;
    fs::write(&hash_path, &current_hash)?;

    log::info!(
        "Vector store built and saved ({} chunks) to {}",
        chunks.len(),
        index_path.display()
    );

    Ok((index, CacheOutcome::Rebuilt { reason }))
}

/// Clear `index` and fill it with freshly embedded chunks.
pub fn build_index(index: &mut VectorIndex, chunks: &[Chunk], embedder: &dyn EmbeddingProvider) -> Result<()> {
    index.rebuild()?;

    for (group_number, group) in chunks.chunks(EMBED_GROUP_SIZE).enumerate() {
        let texts: Vec<String> = group.iter().map(|c| c.content.clone()).collect();
        let approx_tokens: usize = texts.iter().map(|t| estimate_tokens(t)).sum();
        log::debug!(
            "Embedding group {} ({} chunks, ~{} tokens)",
            group_number + 1,
            texts.len(),
            approx_tokens
        );

        let embeddings = embedder.embed_batch(&texts)?;
        index.add_chunks(embedder.model_name(), group, &embeddings)?;
    }

    Ok(())
}

fn try_reuse(index_path: &Path, current_hash: &str, model: &str) -> std::result::Result<VectorIndex, RebuildReason> {
    if !index_path.exists() {
        return Err(RebuildReason::NoIndex);
    }

    let hash_path = hash_file_path(index_path);
    let saved_hash = match fs::read_to_string(&hash_path) {
        Ok(s) => s,
        Err(_) => return Err(RebuildReason::NoHashFile),
    };
    if saved_hash.trim() != current_hash {
        return Err(RebuildReason::NotesChanged);
    }

    let index = VectorIndex::open(index_path).map_err(|e| RebuildReason::OpenFailed(e.to_string()))?;
    if index.embedding_model() != Some(model) {
        // An empty note collection never records a model
        let empty = index.stats().map(|s| s.chunk_count == 0).unwrap_or(false);
        if !(empty && index.embedding_model().is_none()) {
            return Err(RebuildReason::ModelChanged {
                previous: index.embedding_model().map(str::to_string),
            });
        }
    }

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::models::{Metadata, MetadataValue};
    use std::cell::Cell;
    use tempfile::TempDir;

    struct CountingEmbedder {
        model: String,
        calls: Cell<usize>,
    }

    impl CountingEmbedder {
        fn new(model: &str) -> Self {
            Self {
                model: model.to_string(),
                calls: Cell::new(0),
            }
        }
    }

    impl EmbeddingProvider for CountingEmbedder {
        fn embed_batch(&self, texts: &[String]) -> crate::rag::embeddings::Result<Vec<Vec<f32>>> {
            self.calls.set(self.calls.get() + 1);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn model_name(&self) -> &str {
            &self.model
        }
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let mut metadata = Metadata::new();
                metadata.insert("source".to_string(), MetadataValue::from("note.md"));
                Chunk {
                    chunk_index: i as u32,
                    content: text.to_string(),
                    metadata,
                }
            })
            .collect()
    }

    #[test]
    fn test_documents_hash() {
        // SHA-256 of the concatenated contents
        assert_eq!(
            documents_hash(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            documents_hash(&chunks(&["hello", " world"])),
            documents_hash(&chunks(&["hello world"]))
        );
        assert_ne!(
            documents_hash(&chunks(&["a", "b"])),
            documents_hash(&chunks(&["b", "a"]))
        );
    }

    #[test]
    fn test_hash_file_path() {
        assert_eq!(
            hash_file_path(Path::new("/tmp/store.db")),
            PathBuf::from("/tmp/store.db.hash")
        );
    }

    #[test]
    fn test_builds_then_reuses() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.db");
        let embedder = CountingEmbedder::new("model-a");
        let notes = chunks(&["first", "second"]);

        let (index, outcome) = load_or_build(&path, &notes, &embedder, false).unwrap();
        assert_eq!(outcome, CacheOutcome::Rebuilt { reason: RebuildReason::NoIndex });
        assert_eq!(index.stats().unwrap().chunk_count, 2);
        assert_eq!(embedder.calls.get(), 1);
        drop(index);

        let (index, outcome) = load_or_build(&path, &notes, &embedder, false).unwrap();
        assert_eq!(outcome, CacheOutcome::Reused);
        assert_eq!(index.stats().unwrap().chunk_count, 2);
        assert_eq!(embedder.calls.get(), 1);
    }

    #[test]
    fn test_rebuilds_when_notes_change() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.db");
        let embedder = CountingEmbedder::new("model-a");

        load_or_build(&path, &chunks(&["first"]), &embedder, false).unwrap();
        let (index, outcome) = load_or_build(&path, &chunks(&["first", "new"]), &embedder, false).unwrap();

        assert_eq!(outcome, CacheOutcome::Rebuilt { reason: RebuildReason::NotesChanged });
        assert_eq!(index.stats().unwrap().chunk_count, 2);
    }

    #[test]
    fn test_rebuilds_without_hash_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.db");
        let embedder = CountingEmbedder::new("model-a");
        let notes = chunks(&["first"]);

        load_or_build(&path, &notes, &embedder, false).unwrap();
        fs::remove_file(hash_file_path(&path)).unwrap();

        let (_, outcome) = load_or_build(&path, &notes, &embedder, false).unwrap();
        assert_eq!(outcome, CacheOutcome::Rebuilt { reason: RebuildReason::NoHashFile });
        assert!(hash_file_path(&path).exists());
    }

    #[test]
    fn test_rebuilds_when_model_changes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.db");
        let notes = chunks(&["first"]);

        load_or_build(&path, &notes, &CountingEmbedder::new("model-a"), false).unwrap();
        let (index, outcome) = load_or_build(&path, &notes, &CountingEmbedder::new("model-b"), false).unwrap();

        assert_eq!(
            outcome,
            CacheOutcome::Rebuilt {
                reason: RebuildReason::ModelChanged { previous: Some("model-a".to_string()) }
            }
        );
        assert_eq!(index.embedding_model(), Some("model-b"));
    }

    #[test]
    fn test_forced_rebuild() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.db");
        let embedder = CountingEmbedder::new("model-a");
        let notes = chunks(&["first"]);

        load_or_build(&path, &notes, &embedder, false).unwrap();
        let (index, outcome) = load_or_build(&path, &notes, &embedder, true).unwrap();

        assert_eq!(outcome, CacheOutcome::Rebuilt { reason: RebuildReason::Forced });
        assert_eq!(index.stats().unwrap().chunk_count, 1);
        assert_eq!(embedder.calls.get(), 2);
    }

    #[test]
    fn test_corrupt_store_is_replaced() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.db");
        let embedder = CountingEmbedder::new("model-a");
        let notes = chunks(&["first"]);

        fs::write(&path, vec![b'x'; 4096]).unwrap();
        fs::write(hash_file_path(&path), documents_hash(&notes)).unwrap();

        let (index, outcome) = load_or_build(&path, &notes, &embedder, false).unwrap();
        assert!(matches!(
            outcome,
            CacheOutcome::Rebuilt { reason: RebuildReason::OpenFailed(_) }
        ));
        assert_eq!(index.stats().unwrap().chunk_count, 1);
    }

    #[test]
    fn test_empty_notes_are_reusable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.db");
        let embedder = CountingEmbedder::new("model-a");

        load_or_build(&path, &[], &embedder, false).unwrap();
        let (_, outcome) = load_or_build(&path, &[], &embedder, false).unwrap();
        assert_eq!(outcome, CacheOutcome::Reused);
        assert_eq!(embedder.calls.get(), 0);
    }
}
