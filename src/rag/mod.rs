//! RAG (Retrieval-Augmented Generation) module: chunking, embeddings,
//! vector storage and retrieval.

mod cache;
mod chunker;
mod embeddings;
mod index;
mod models;
mod retriever;

pub use cache::{
    build_index, documents_hash, hash_file_path, load_or_build, CacheError, CacheOutcome,
    RebuildReason,
};
pub use chunker::{estimate_tokens, SplitterError, TextSplitter, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use embeddings::{EmbeddingError, EmbeddingProvider, OpenAiEmbeddings};
pub use index::{cosine_similarity, IndexEntry, IndexStats, VectorIndex, VectorIndexError};
pub use models::{
    Chunk, Document, EmbeddingConfig, Metadata, MetadataValue, RetrievedChunk, SOURCE_KEY,
};
pub use retriever::{Retriever, SearchMode};

pub(crate) use embeddings::{api_error_message, openai_endpoint};
