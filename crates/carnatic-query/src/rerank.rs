//! Cross-encoder re-ranking.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use carnatic_core::{
    CarnaticError, Chunk, RelevanceModel, Result, RetrievalOutcome, ScoredChunk,
};

use crate::context::bounded;

/// Result of a re-ranking pass.
#[derive(Debug)]
pub enum Reranked {
    /// Chunks sorted by descending score.
    Scored(Vec<ScoredChunk>),

    /// The model failed; chunks keep their original order.
    Unscored {
        chunks: Vec<Chunk>,
        error: CarnaticError,
    },
}

impl Reranked {
    pub fn len(&self) -> usize {
        match self {
            Self::Scored(scored) => scored.len(),
            Self::Unscored { chunks, .. } => chunks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_chunks(self) -> Vec<Chunk> {
        match self {
            Self::Scored(scored) => scored.into_iter().map(|s| s.chunk).collect(),
            Self::Unscored { chunks, .. } => chunks,
        }
    }

    /// Convert into a tool outcome. Empty results become `NoResults`.
    pub fn into_outcome(self) -> RetrievalOutcome {
        if self.is_empty() {
            return RetrievalOutcome::NoResults;
        }
        match self {
            Self::Scored(scored) => RetrievalOutcome::Ranked(scored),
            Self::Unscored { chunks, error } => RetrievalOutcome::Degraded {
                chunks,
                reason: error.to_string(),
            },
        }
    }
}

/// Descending by score; equal scores compare equal so a stable sort keeps
/// input order, and NaN sorts after every number.
fn by_score_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Re-ranks candidates with a pairwise relevance model.
#[derive(Clone)]
pub struct Reranker {
    model: Arc<dyn RelevanceModel>,
    timeout: Duration,
}

impl Reranker {
    pub fn new(model: Arc<dyn RelevanceModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// Score every candidate against `query` in one batch and keep the best
    /// `top_k`.
    ///
    /// An empty candidate list returns immediately without a model call. If
    /// the model fails or times out, the first `top_k` candidates are
    /// returned in their original order.
    pub async fn rerank(&self, query: &str, candidates: Vec<Chunk>, top_k: usize) -> Reranked {
        if candidates.is_empty() {
            return Reranked::Scored(Vec::new());
        }

        let scores = match self.score(query, &candidates).await {
            Ok(scores) => scores,
            Err(error) => {
                warn!("Re-ranking failed, keeping original order: {}", error);
                let mut chunks = candidates;
                chunks.truncate(top_k);
                return Reranked::Unscored { chunks, error };
            }
        };

        let mut scored: Vec<ScoredChunk> = candidates
            .into_iter()
            .zip(scores)
            .map(|(chunk, score)| ScoredChunk { chunk, score })
            .collect();

        // sort_by is stable
        scored.sort_by(|a, b| by_score_desc(a.score, b.score));
        scored.truncate(top_k);

        debug!("Re-ranked to {} chunks", scored.len());
        Reranked::Scored(scored)
    }

    async fn score(&self, query: &str, candidates: &[Chunk]) -> Result<Vec<f32>> {
        let pairs: Vec<(&str, &str)> = candidates
            .iter()
            .map(|c| (query, c.content.as_str()))
            .collect();

        let scores = bounded("re-ranking", self.timeout, self.model.predict(&pairs)).await?;

        if scores.len() != candidates.len() {
            return Err(CarnaticError::rerank(format!(
                "Model returned {} scores for {} candidates",
                scores.len(),
                candidates.len()
            )));
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use carnatic_core::{Category, ChunkMetadata};
    use carnatic_models::MockRelevanceModel;

    fn chunk(text: &str) -> Chunk {
        Chunk::new(text, ChunkMetadata::for_category(Category::Raga, "ragas.pdf"))
    }

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.content.as_str()).collect()
    }

    /// Returns fixed scores regardless of input.
    struct FixedScores(Vec<f32>);

    #[async_trait]
    impl RelevanceModel for FixedScores {
        async fn predict(&self, _pairs: &[(&str, &str)]) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    fn reranker(model: impl RelevanceModel + 'static) -> Reranker {
        Reranker::new(Arc::new(model), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_sorts_by_descending_score() {
        let reranker = reranker(FixedScores(vec![0.1, 0.9, 0.5]));
        let out = reranker
            .rerank("q", vec![chunk("a"), chunk("b"), chunk("c")], 3)
            .await;

        match out {
            Reranked::Scored(scored) => {
                let order: Vec<&str> = scored.iter().map(|s| s.chunk.content.as_str()).collect();
                assert_eq!(order, vec!["b", "c", "a"]);
                assert!(scored.windows(2).all(|w| w[0].score >= w[1].score));
            }
            other => panic!("expected scored result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_length_is_min_of_top_k_and_candidates() {
        let model = Arc::new(MockRelevanceModel::new());
        let reranker = Reranker::new(model, Duration::from_secs(5));

        for n in 0..5 {
            for top_k in 0..7 {
                let candidates = (0..n).map(|i| chunk(&format!("raga {}", i))).collect();
                let out = reranker.rerank("raga", candidates, top_k).await;
                assert_eq!(out.len(), top_k.min(n));
            }
        }
    }

    #[tokio::test]
    async fn test_empty_input_skips_model() {
        let model = Arc::new(MockRelevanceModel::new());
        let reranker = Reranker::new(model.clone(), Duration::from_secs(5));

        let out = reranker.rerank("anything", Vec::new(), 6).await;
        assert!(out.is_empty());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_ties_keep_original_order_and_nan_last() {
        let reranker = reranker(FixedScores(vec![0.5, f32::NAN, 0.5, 0.9, 0.5]));
        let out = reranker
            .rerank(
                "q",
                vec![chunk("a"), chunk("nan"), chunk("b"), chunk("top"), chunk("c")],
                5,
            )
            .await
            .into_chunks();

        assert_eq!(texts(&out), vec!["top", "a", "b", "c", "nan"]);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_original_order() {
        let reranker = reranker(MockRelevanceModel::failing());
        let out = reranker
            .rerank("q", vec![chunk("a"), chunk("b"), chunk("c")], 2)
            .await;

        match out {
            Reranked::Unscored { chunks, error } => {
                assert_eq!(texts(&chunks), vec!["a", "b"]);
                assert_eq!(error.error_code(), "RERANK_ERROR");
            }
            other => panic!("expected unscored result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_score_count_mismatch_degrades() {
        let reranker = reranker(FixedScores(vec![1.0]));
        let out = reranker.rerank("q", vec![chunk("a"), chunk("b")], 2).await;
        assert!(matches!(out, Reranked::Unscored { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_degrades_with_timeout_error() {
        let model = MockRelevanceModel::with_delay(Duration::from_secs(60));
        let reranker = Reranker::new(Arc::new(model), Duration::from_millis(100));

        match reranker.rerank("q", vec![chunk("a"), chunk("b")], 1).await {
            Reranked::Unscored { chunks, error } => {
                assert_eq!(texts(&chunks), vec!["a"]);
                assert!(error.is_timeout());
            }
            other => panic!("expected unscored result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_fires_while_model_holds_a_thread() {
        let model = MockRelevanceModel::blocking(Duration::from_millis(500));
        let reranker = Reranker::new(Arc::new(model), Duration::from_millis(50));

        let start = std::time::Instant::now();
        let out = reranker.rerank("q", vec![chunk("a"), chunk("b")], 2).await;
        let elapsed = start.elapsed();

        match out {
            Reranked::Unscored { chunks, error } => {
                assert_eq!(texts(&chunks), vec!["a", "b"]);
                assert!(error.is_timeout());
            }
            other => panic!("expected unscored result, got {:?}", other),
        }
        assert!(elapsed < Duration::from_millis(400), "waited {:?}", elapsed);
    }

    #[test]
    fn test_into_outcome() {
        assert!(matches!(
            Reranked::Scored(Vec::new()).into_outcome(),
            RetrievalOutcome::NoResults
        ));

        let degraded = Reranked::Unscored {
            chunks: vec![chunk("a")],
            error: CarnaticError::rerank("boom"),
        }
        .into_outcome();
        assert!(degraded.is_degraded());
        assert_eq!(degraded.len(), 1);
    }
}
