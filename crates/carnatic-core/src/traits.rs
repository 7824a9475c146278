//! Core traits defining the interfaces between components.

use async_trait::async_trait;
use ulid::Ulid;

use crate::error::Result;
use crate::types::{Chunk, IndexStats};

/// Persisted chunk storage with category-filtered nearest-neighbour search.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert chunks together with their embeddings (same order, same length).
    async fn insert_chunks(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()>;

    async fn get_chunk(&self, id: Ulid) -> Result<Option<Chunk>>;

    /// Fetch chunks by id, preserving the order of `ids`. Missing ids are skipped.
    async fn get_chunks(&self, ids: &[Ulid]) -> Result<Vec<Chunk>>;

    /// Return up to `k` `(chunk_id, similarity)` pairs whose category equals
    /// `category`, best first.
    async fn vector_search(
        &self,
        embedding: &[f32],
        k: u32,
        category: &str,
    ) -> Result<Vec<(Ulid, f32)>>;

    async fn stats(&self) -> Result<IndexStats>;
}

/// Text-level similarity search, as consumed by the retrieval tools.
///
/// Embedding the query is the implementation's concern.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return at most `k` chunks of `category` nearest to `query`, best first.
    /// An unknown category yields an empty list.
    async fn similarity_search(&self, query: &str, k: usize, category: &str) -> Result<Vec<Chunk>>;
}

/// Embedding model trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of document texts.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// Get the maximum context length in tokens.
    fn max_tokens(&self) -> usize;
}

/// Pairwise relevance model (cross-encoder).
#[async_trait]
pub trait RelevanceModel: Send + Sync {
    /// Score each `(query, candidate)` pair. Returns one score per pair in
    /// input order; higher means more relevant.
    async fn predict(&self, pairs: &[(&str, &str)]) -> Result<Vec<f32>>;
}

/// Text generation model used to compose answers.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}
