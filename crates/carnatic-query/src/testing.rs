//! Index doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use carnatic_core::{CarnaticError, Category, Chunk, ChunkMetadata, Result, VectorIndex};

/// Serves a fixed chunk list in insertion order.
pub struct StaticIndex {
    chunks: Vec<Chunk>,
    calls: AtomicUsize,
}

impl StaticIndex {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self {
            chunks,
            calls: AtomicUsize::new(0),
        }
    }

    /// `n` chunks per category, texts `"{category} {i}"`.
    pub fn with_counts(counts: &[(Category, usize)]) -> Self {
        let chunks = counts
            .iter()
            .flat_map(|(category, n)| {
                (0..*n).map(move |i| {
                    Chunk::new(
                        &format!("{} {}", category.id(), i),
                        ChunkMetadata::for_category(*category, "fixture.pdf"),
                    )
                })
            })
            .collect();
        Self::new(chunks)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for StaticIndex {
    async fn similarity_search(&self, _query: &str, k: usize, category: &str) -> Result<Vec<Chunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .chunks
            .iter()
            .filter(|c| c.metadata.category == category)
            .take(k)
            .cloned()
            .collect())
    }
}

/// Fails every lookup, or only lookups for one category.
pub struct FailingIndex {
    pub only: Option<&'static str>,
    pub fallback: StaticIndex,
}

impl FailingIndex {
    pub fn always() -> Self {
        Self {
            only: None,
            fallback: StaticIndex::new(Vec::new()),
        }
    }

    pub fn for_category(category: &'static str, fallback: StaticIndex) -> Self {
        Self {
            only: Some(category),
            fallback,
        }
    }
}

#[async_trait]
impl VectorIndex for FailingIndex {
    async fn similarity_search(&self, query: &str, k: usize, category: &str) -> Result<Vec<Chunk>> {
        match self.only {
            Some(only) if only != category => self.fallback.similarity_search(query, k, category).await,
            _ => Err(CarnaticError::database("backing store unavailable")),
        }
    }
}
