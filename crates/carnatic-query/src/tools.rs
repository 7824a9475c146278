//! Single-category retrieval tools.

use tracing::{debug, info, warn};

use carnatic_core::{
    CarnaticError, Category, Result, RetrievalConfig, RetrievalOutcome, ToolId,
};

use crate::context::RetrievalContext;
use crate::rerank::Reranked;

/// Fetch `fetch_k` candidates from one category and re-rank to `top_k`.
pub(crate) async fn category_pass(
    ctx: &RetrievalContext,
    query: &str,
    category: &str,
    fetch_k: usize,
    top_k: usize,
) -> Result<Reranked> {
    let candidates = ctx
        .index()
        .similarity_search(query, fetch_k, category)
        .await
        .map_err(as_index_error)?;

    debug!("{}: {} candidates", category, candidates.len());

    Ok(ctx.reranker().rerank(query, candidates, top_k).await)
}

/// Index lookups fail as `IndexQuery`; timeouts keep their own kind.
fn as_index_error(err: CarnaticError) -> CarnaticError {
    match err {
        CarnaticError::IndexQuery { .. } | CarnaticError::Timeout { .. } => err,
        other => CarnaticError::index_query(other.to_string()),
    }
}

/// Searches one fixed category: over-fetch, then re-rank down.
#[derive(Debug, Clone)]
pub struct CategorySearchTool {
    tool: ToolId,
    category: Category,
    fetch_k: usize,
    top_k: usize,
}

impl CategorySearchTool {
    /// Bind `tool` to its category. Fails for the fusion tool, which has none.
    pub fn new(tool: ToolId, fetch_k: usize, top_k: usize) -> Result<Self> {
        let category = tool.category().ok_or_else(|| {
            CarnaticError::invalid_argument(format!("{} is not a single-category tool", tool))
        })?;

        Ok(Self {
            tool,
            category,
            fetch_k,
            top_k,
        })
    }

    pub fn from_config(tool: ToolId, config: &RetrievalConfig) -> Result<Self> {
        Self::new(tool, config.fetch_k, config.top_k)
    }

    pub fn tool(&self) -> ToolId {
        self.tool
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Run the search. Lookup failures come back as `Failed` rather than
    /// an error so callers can carry on with other tools.
    pub async fn search(&self, ctx: &RetrievalContext, query: &str) -> RetrievalOutcome {
        info!("{} searching {}: {:?}", self.tool, self.category, query);

        match category_pass(ctx, query, self.category.id(), self.fetch_k, self.top_k).await {
            Ok(reranked) => reranked.into_outcome(),
            Err(e) => {
                warn!("{} lookup failed: {}", self.tool, e);
                RetrievalOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use carnatic_core::RelevanceModel;
    use carnatic_models::MockRelevanceModel;

    use crate::testing::{FailingIndex, StaticIndex};

    fn ctx(index: impl carnatic_core::VectorIndex + 'static, model: Arc<dyn RelevanceModel>) -> RetrievalContext {
        RetrievalContext::new(Arc::new(index), model, RetrievalConfig::default())
    }

    fn raga_tool() -> CategorySearchTool {
        CategorySearchTool::from_config(ToolId::RagaIndexTool, &RetrievalConfig::default()).unwrap()
    }

    #[test]
    fn test_binding() {
        let tool = raga_tool();
        assert_eq!(tool.tool(), ToolId::RagaIndexTool);
        assert_eq!(tool.category(), Category::Raga);

        let err = CategorySearchTool::new(ToolId::MultiSearch, 12, 6).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_fetches_twelve_keeps_six() {
        let index = StaticIndex::with_counts(&[(Category::Raga, 20), (Category::Literature, 5)]);
        let ctx = ctx(index, Arc::new(MockRelevanceModel::new()));

        let outcome = raga_tool().search(&ctx, "Raga 11").await;
        match &outcome {
            RetrievalOutcome::Ranked(scored) => {
                assert_eq!(scored.len(), 6);
                assert!(scored.iter().all(|s| s.chunk.metadata.category == "Raga"));
                // Only "Raga 11" matches both terms, and it is within the first 12.
                assert_eq!(scored[0].chunk.content, "Raga 11");
            }
            other => panic!("expected ranked outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fewer_candidates_than_top_k() {
        let index = StaticIndex::with_counts(&[(Category::Raga, 2)]);
        let ctx = ctx(index, Arc::new(MockRelevanceModel::new()));

        assert_eq!(raga_tool().search(&ctx, "melakarta").await.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_category_is_no_results() {
        let index = StaticIndex::with_counts(&[(Category::Literature, 3)]);
        let model = Arc::new(MockRelevanceModel::new());
        let ctx = ctx(index, model.clone());

        let outcome = raga_tool().search(&ctx, "kalyani").await;
        assert!(matches!(outcome, RetrievalOutcome::NoResults));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_index_failure_is_failed_outcome() {
        let ctx = ctx(FailingIndex::always(), Arc::new(MockRelevanceModel::new()));

        match raga_tool().search(&ctx, "kalyani").await {
            RetrievalOutcome::Failed(e) => assert_eq!(e.error_code(), "INDEX_QUERY_ERROR"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rerank_failure_keeps_index_order() {
        let index = StaticIndex::with_counts(&[(Category::Raga, 20)]);
        let ctx = ctx(index, Arc::new(MockRelevanceModel::failing()));

        match raga_tool().search(&ctx, "anything").await {
            RetrievalOutcome::Degraded { chunks, reason } => {
                let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
                assert_eq!(texts, vec!["Raga 0", "Raga 1", "Raga 2", "Raga 3", "Raga 4", "Raga 5"]);
                assert!(reason.contains("mock relevance model failure"));
            }
            other => panic!("expected degraded outcome, got {:?}", other),
        }
    }
}
