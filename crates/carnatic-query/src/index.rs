//! Text-level similarity search over an embedded chunk store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;
use ulid::Ulid;

use carnatic_core::{Category, Chunk, ChunkStore, Embedder, Result, VectorIndex};

use crate::context::bounded;

/// Embeds queries and searches a chunk store, one category at a time.
pub struct SemanticIndex<S: ?Sized, E: ?Sized> {
    /// Storage backend.
    store: Arc<S>,

    /// Embedding model.
    embedder: Arc<E>,

    /// Limit for each of the embedding, search and lookup calls.
    timeout: Duration,
}

impl<S, E> SemanticIndex<S, E>
where
    S: ChunkStore + ?Sized,
    E: Embedder + ?Sized,
{
    pub fn new(store: Arc<S>, embedder: Arc<E>, timeout: Duration) -> Self {
        Self {
            store,
            embedder,
            timeout,
        }
    }
}

#[async_trait]
impl<S, E> VectorIndex for SemanticIndex<S, E>
where
    S: ChunkStore + ?Sized,
    E: Embedder + ?Sized,
{
    async fn similarity_search(&self, query: &str, k: usize, category: &str) -> Result<Vec<Chunk>> {
        if k == 0 || Category::from_id(category).is_none() {
            debug!("Skipping search: k={}, category={:?}", k, category);
            return Ok(Vec::new());
        }

        let start = Instant::now();

        let embedding = bounded(
            "query embedding",
            self.timeout,
            self.embedder.embed_query(query),
        )
        .await?;

        let k = u32::try_from(k).unwrap_or(u32::MAX);
        let hits = bounded(
            "index search",
            self.timeout,
            self.store.vector_search(&embedding, k, category),
        )
        .await?;

        let ids: Vec<Ulid> = hits.iter().map(|(id, _)| *id).collect();
        let chunks = bounded("chunk lookup", self.timeout, self.store.get_chunks(&ids)).await?;

        debug!(
            "Found {} {} chunks in {}ms",
            chunks.len(),
            category,
            start.elapsed().as_millis()
        );

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carnatic_core::{ChunkMetadata, IndexStats};
    use carnatic_models::MockEmbedder;
    use carnatic_store::SqliteStore;

    /// Delegates to an in-memory store but never finishes a chunk lookup.
    struct StalledLookup(SqliteStore);

    #[async_trait]
    impl ChunkStore for StalledLookup {
        async fn insert_chunks(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
            self.0.insert_chunks(chunks, embeddings).await
        }

        async fn get_chunk(&self, id: Ulid) -> Result<Option<Chunk>> {
            self.0.get_chunk(id).await
        }

        async fn get_chunks(&self, _ids: &[Ulid]) -> Result<Vec<Chunk>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }

        async fn vector_search(
            &self,
            embedding: &[f32],
            k: u32,
            category: &str,
        ) -> Result<Vec<(Ulid, f32)>> {
            self.0.vector_search(embedding, k, category).await
        }

        async fn stats(&self) -> Result<IndexStats> {
            self.0.stats().await
        }
    }

    async fn seeded() -> SemanticIndex<SqliteStore, MockEmbedder> {
        let embedder = Arc::new(MockEmbedder::with_config(64, 256));
        let store = Arc::new(SqliteStore::open_memory(64).unwrap());

        let chunks = vec![
            Chunk::new(
                "Mayamalavagowla is the fifteenth melakarta raga",
                ChunkMetadata::for_category(Category::Raga, "ragas.pdf"),
            ),
            Chunk::new(
                "Kalyani is the sixty-fifth melakarta raga",
                ChunkMetadata::for_category(Category::Raga, "ragas.pdf"),
            ),
            Chunk::new(
                "Sarali varisai are taught in Mayamalavagowla",
                ChunkMetadata::for_category(Category::Literature, "theory.pdf"),
            ),
        ];
        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = embedder.embed_documents(&texts).await.unwrap();
        store.insert_chunks(&chunks, &embeddings).await.unwrap();

        SemanticIndex::new(store, embedder, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_search_is_filtered_by_category() {
        let index = seeded().await;

        let raga = index
            .similarity_search("Mayamalavagowla", 10, "Raga")
            .await
            .unwrap();
        assert_eq!(raga.len(), 2);
        assert!(raga.iter().all(|c| c.metadata.category == "Raga"));
        assert!(raga[0].content.starts_with("Mayamalavagowla"));

        let literature = index
            .similarity_search("Mayamalavagowla", 10, "Literature")
            .await
            .unwrap();
        assert_eq!(literature.len(), 1);
    }

    #[tokio::test]
    async fn test_k_limits_results() {
        let index = seeded().await;
        let hits = index.similarity_search("melakarta", 1, "Raga").await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_absent_or_unknown_category_is_empty() {
        let index = seeded().await;
        assert!(index
            .similarity_search("tala", 12, "Krithis")
            .await
            .unwrap()
            .is_empty());
        assert!(index
            .similarity_search("tala", 12, "Hindustani")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_lookup_is_bounded() {
        let embedder = Arc::new(MockEmbedder::with_config(64, 256));
        let store = StalledLookup(SqliteStore::open_memory(64).unwrap());
        let chunk = Chunk::new(
            "Kalyani is the sixty-fifth melakarta raga",
            ChunkMetadata::for_category(Category::Raga, "ragas.pdf"),
        );
        let embeddings = embedder.embed_documents(&[chunk.content.as_str()]).await.unwrap();
        store.insert_chunks(&[chunk], &embeddings).await.unwrap();

        let index = SemanticIndex::new(Arc::new(store), embedder, Duration::from_secs(1));
        let err = index.similarity_search("Kalyani", 12, "Raga").await.unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("chunk lookup"));
    }
}
