//! Shared retrieval handles.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use carnatic_core::{CarnaticError, RelevanceModel, Result, RetrievalConfig, VectorIndex};

use crate::rerank::Reranker;

/// Await `fut`, failing with a `Timeout` error once `limit` elapses.
pub(crate) async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(CarnaticError::timeout(operation, limit.as_millis() as u64)),
    }
}

/// Everything a retrieval tool needs, built once and shared read-only.
#[derive(Clone)]
pub struct RetrievalContext {
    index: Arc<dyn VectorIndex>,
    reranker: Reranker,
    config: RetrievalConfig,
}

impl RetrievalContext {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        relevance: Arc<dyn RelevanceModel>,
        config: RetrievalConfig,
    ) -> Self {
        let reranker = Reranker::new(relevance, Duration::from_millis(config.timeout_ms));
        Self {
            index,
            reranker,
            config,
        }
    }

    pub fn index(&self) -> &dyn VectorIndex {
        self.index.as_ref()
    }

    pub fn reranker(&self) -> &Reranker {
        &self.reranker
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let value = bounded("noop", Duration::from_millis(50), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let err = bounded("slow call", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "slow call timed out after 10ms");
    }
}
