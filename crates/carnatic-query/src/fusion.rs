//! Multi-category result fusion.
//!
//! Each requested category is searched and re-ranked on its own first, so a
//! dominant category cannot crowd the others out of the candidate pool. The
//! pooled survivors are then re-ranked together for a single global order.

use std::collections::HashSet;

use futures::future::join_all;
use tracing::{debug, info, warn};

use carnatic_core::{CarnaticError, Chunk, RetrievalConfig, RetrievalOutcome};

use crate::context::RetrievalContext;
use crate::tools::category_pass;

/// Searches several categories and fuses the results.
#[derive(Debug, Clone)]
pub struct MultiSearchTool {
    /// Cap on the fused result length.
    top_k: usize,
}

impl MultiSearchTool {
    /// Per-category result count when the caller gives none.
    pub const DEFAULT_K_EACH: usize = 4;

    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.fusion_top_k)
    }

    /// Search `categories` in order, keeping `k_each` per category from
    /// `2 * k_each` candidates, then re-rank the pool to
    /// `min(pool size, top_k)`.
    ///
    /// The category passes run concurrently; results keep `categories` order.
    /// Unknown categories contribute nothing. A failing category is skipped;
    /// the outcome is `Failed` only when every pass failed.
    pub async fn search(
        &self,
        ctx: &RetrievalContext,
        query: &str,
        categories: &[String],
        k_each: usize,
    ) -> RetrievalOutcome {
        if k_each == 0 {
            return RetrievalOutcome::Failed(CarnaticError::invalid_argument(
                "k_each must be greater than 0",
            ));
        }

        info!("multi_search over {:?}: {:?}", categories, query);

        let fetch_k = k_each.saturating_mul(2);
        let passes = join_all(
            categories
                .iter()
                .map(|category| category_pass(ctx, query, category, fetch_k, k_each)),
        )
        .await;

        let mut pool: Vec<Chunk> = Vec::new();
        let mut first_error = None;

        for (category, pass) in categories.iter().zip(passes) {
            match pass {
                Ok(reranked) => {
                    debug!("{} contributed {} chunks", category, reranked.len());
                    pool.extend(reranked.into_chunks());
                }
                Err(e) => {
                    warn!("Fusion pass for {} failed: {}", category, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if pool.is_empty() {
            return match first_error {
                Some(e) => RetrievalOutcome::Failed(e),
                None => RetrievalOutcome::NoResults,
            };
        }

        note_repeated_content(&pool);

        let keep = pool.len().min(self.top_k);
        debug!("Re-ranking pool of {} down to {}", pool.len(), keep);

        ctx.reranker().rerank(query, pool, keep).await.into_outcome()
    }
}

/// Categories are disjoint, so the pool is not deduplicated. Repeats point
/// at inconsistent metadata and are only logged.
fn note_repeated_content(pool: &[Chunk]) {
    let mut seen = HashSet::new();
    for chunk in pool {
        if let Some(hash) = chunk.content_hash {
            if !seen.insert(hash) {
                debug!(
                    "Fusion pool holds repeated content {} ({} | {})",
                    chunk.content_hash_hex().unwrap_or_default(),
                    chunk.category(),
                    chunk.source()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use carnatic_core::{Category, RelevanceModel, VectorIndex};
    use carnatic_models::MockRelevanceModel;

    use crate::testing::{FailingIndex, StaticIndex};

    fn ctx(index: impl VectorIndex + 'static, model: Arc<dyn RelevanceModel>) -> RetrievalContext {
        RetrievalContext::new(Arc::new(index), model, RetrievalConfig::default())
    }

    fn all_categories() -> Vec<String> {
        Category::all_ids()
    }

    fn tool() -> MultiSearchTool {
        MultiSearchTool::from_config(&RetrievalConfig::default())
    }

    #[tokio::test]
    async fn test_pool_of_seven_stays_seven() {
        let index = StaticIndex::with_counts(&[(Category::Literature, 3), (Category::Raga, 10)]);
        let model = Arc::new(MockRelevanceModel::new());
        let ctx = ctx(index, model.clone());

        let outcome = tool().search(&ctx, "Raga", &all_categories(), 4).await;

        assert!(matches!(outcome, RetrievalOutcome::Ranked(_)));
        assert_eq!(outcome.len(), 7);

        let chunks = outcome.chunks();
        assert_eq!(chunks.iter().filter(|c| c.metadata.category == "Literature").count(), 3);
        assert_eq!(chunks.iter().filter(|c| c.metadata.category == "Raga").count(), 4);

        // Literature and Raga passes plus the final pass; Krithis had no candidates.
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_category_passes_overlap() {
        let index = StaticIndex::with_counts(&[
            (Category::Literature, 5),
            (Category::Raga, 5),
            (Category::Krithis, 5),
        ]);
        let delay = std::time::Duration::from_millis(300);
        let model = Arc::new(MockRelevanceModel::blocking(delay));
        let ctx = ctx(index, model.clone());

        let start = std::time::Instant::now();
        let outcome = tool().search(&ctx, "Raga", &all_categories(), 2).await;
        let elapsed = start.elapsed();

        assert_eq!(outcome.len(), 6);
        assert_eq!(model.calls(), 4);
        // Three category passes side by side, then the final pass: two
        // model delays rather than four.
        assert!(elapsed < delay * 3, "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_final_pass_caps_at_eight() {
        let index = StaticIndex::with_counts(&[
            (Category::Literature, 10),
            (Category::Raga, 10),
            (Category::Krithis, 10),
        ]);
        let ctx = ctx(index, Arc::new(MockRelevanceModel::new()));

        let outcome = tool().search(&ctx, "Krithis", &all_categories(), 4).await;
        assert_eq!(outcome.len(), 8);

        // The final pass orders globally: all krithis outrank the rest.
        let chunks = outcome.chunks();
        assert!(chunks[..4].iter().all(|c| c.metadata.category == "Krithis"));
    }

    #[tokio::test]
    async fn test_fetches_twice_k_each() {
        let index = StaticIndex::with_counts(&[(Category::Raga, 10)]);
        let ctx = ctx(index, Arc::new(MockRelevanceModel::failing()));

        // With a failing model the degraded pass keeps the first k_each of
        // 2 * k_each candidates in index order.
        let outcome = tool()
            .search(&ctx, "q", &["Raga".to_string()], 3)
            .await;
        let texts: Vec<&str> = outcome.chunks().iter().map(|c| c.content.as_str()).collect();
        assert_eq!(texts, vec!["Raga 0", "Raga 1", "Raga 2"]);
        assert!(outcome.is_degraded());
    }

    #[tokio::test]
    async fn test_unknown_category_contributes_nothing() {
        let index = StaticIndex::with_counts(&[(Category::Raga, 2)]);
        let ctx = ctx(index, Arc::new(MockRelevanceModel::new()));

        let categories = vec!["Hindustani".to_string(), "Raga".to_string()];
        assert_eq!(tool().search(&ctx, "raga", &categories, 4).await.len(), 2);

        let unknown = vec!["Hindustani".to_string()];
        assert!(matches!(
            tool().search(&ctx, "raga", &unknown, 4).await,
            RetrievalOutcome::NoResults
        ));
    }

    #[tokio::test]
    async fn test_zero_k_each_is_rejected() {
        let index = StaticIndex::with_counts(&[(Category::Raga, 2)]);
        let ctx = ctx(index, Arc::new(MockRelevanceModel::new()));

        match tool().search(&ctx, "raga", &all_categories(), 0).await {
            RetrievalOutcome::Failed(e) => assert_eq!(e.error_code(), "INVALID_ARGUMENT"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_one_failing_category_does_not_abort() {
        let healthy = StaticIndex::with_counts(&[(Category::Literature, 2), (Category::Krithis, 2)]);
        let ctx = ctx(
            FailingIndex::for_category("Raga", healthy),
            Arc::new(MockRelevanceModel::new()),
        );

        let outcome = tool().search(&ctx, "q", &all_categories(), 4).await;
        assert!(!outcome.is_failed());
        assert_eq!(outcome.len(), 4);
    }

    #[tokio::test]
    async fn test_all_failing_is_failed() {
        let ctx = ctx(FailingIndex::always(), Arc::new(MockRelevanceModel::new()));

        match tool().search(&ctx, "q", &all_categories(), 4).await {
            RetrievalOutcome::Failed(e) => assert_eq!(e.error_code(), "INDEX_QUERY_ERROR"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_repeated_content_is_kept() {
        let duplicate = Chunk::new(
            "Tyagaraja",
            carnatic_core::ChunkMetadata::for_category(Category::Krithis, "a.pdf"),
        );
        let mut mislabeled = duplicate.clone();
        mislabeled.metadata.category = "Raga".to_string();

        let index = StaticIndex::new(vec![duplicate, mislabeled]);
        let ctx = ctx(index, Arc::new(MockRelevanceModel::new()));

        let outcome = tool().search(&ctx, "Tyagaraja", &all_categories(), 4).await;
        assert_eq!(outcome.len(), 2);
    }
}
