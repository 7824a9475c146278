//! Process-wide handle over the loaded index and models.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use carnatic_core::{
    AssistantConfig, CarnaticError, Chunk, ChunkStore, Embedder, IndexStats, LanguageModel,
    RelevanceModel, Result,
};
use carnatic_models::{ChatCompletionsClient, OnnxCrossEncoder, OnnxEmbedder};
use carnatic_query::{RetrievalContext, SemanticIndex, ToolSelector};
use carnatic_store::SqliteStore;

/// Collaborators a handle is assembled from.
pub struct Components {
    pub store: Arc<SqliteStore>,
    pub embedder: Arc<dyn Embedder>,
    pub relevance: Arc<dyn RelevanceModel>,

    /// `None` for retrieval-only handles.
    pub llm: Option<Arc<dyn LanguageModel>>,
}

/// Shared, read-only state built once per process.
///
/// Cloning is cheap; every clone points at the same index and models.
#[derive(Clone)]
pub struct Handle {
    config: Arc<AssistantConfig>,
    store: Arc<SqliteStore>,
    embedder: Arc<dyn Embedder>,
    llm: Option<Arc<dyn LanguageModel>>,
    retrieval: RetrievalContext,
    selector: ToolSelector,
}

impl Handle {
    /// Open the index and load every model named by `config`.
    pub fn init(config: &AssistantConfig) -> Result<Self> {
        Self::load(config, true)
    }

    /// Like [`Handle::init`] without the language model, for retrieval-only
    /// use. Needs no API key.
    pub fn init_retrieval(config: &AssistantConfig) -> Result<Self> {
        Self::load(config, false)
    }

    fn load(config: &AssistantConfig, with_llm: bool) -> Result<Self> {
        config.validate()?;

        info!("Initializing assistant with index at {:?}", config.database.path);

        let embedder = Arc::new(OnnxEmbedder::new(&config.embedding)?);
        let store = Arc::new(SqliteStore::open_with_config(
            &config.database,
            embedder.dimension(),
        )?);
        let relevance = Arc::new(OnnxCrossEncoder::new(&config.reranker)?);
        let llm: Option<Arc<dyn LanguageModel>> = if with_llm {
            Some(Arc::new(ChatCompletionsClient::new(&config.llm)?))
        } else {
            None
        };

        Self::with_components(
            config.clone(),
            Components {
                store,
                embedder,
                relevance,
                llm,
            },
        )
    }

    /// Build a handle from already constructed collaborators.
    pub fn with_components(config: AssistantConfig, components: Components) -> Result<Self> {
        config.validate()?;

        let Components {
            store,
            embedder,
            relevance,
            llm,
        } = components;

        if embedder.dimension() != store.dimension() {
            return Err(CarnaticError::config(format!(
                "embedder produces dimension {}, index holds {}",
                embedder.dimension(),
                store.dimension()
            )));
        }

        let timeout = Duration::from_millis(config.retrieval.timeout_ms);
        let index = SemanticIndex::new(store.clone(), embedder.clone(), timeout);
        let retrieval = RetrievalContext::new(Arc::new(index), relevance, config.retrieval.clone());
        let selector = ToolSelector::new(config.selection.clone());

        match &llm {
            Some(llm) => debug!("Handle ready, language model {}", llm.model_name()),
            None => debug!("Handle ready, retrieval only"),
        }

        Ok(Self {
            config: Arc::new(config),
            store,
            embedder,
            llm,
            retrieval,
            selector,
        })
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn retrieval(&self) -> &RetrievalContext {
        &self.retrieval
    }

    pub fn selector(&self) -> &ToolSelector {
        &self.selector
    }

    /// The language model, or a `Config` error for retrieval-only handles.
    pub fn llm(&self) -> Result<&dyn LanguageModel> {
        self.llm
            .as_deref()
            .ok_or_else(|| CarnaticError::config("no language model configured"))
    }

    /// Embed and store pre-chunked content, `batch_size` chunks at a time.
    /// Returns the number of chunks stored.
    pub async fn import(&self, chunks: &[Chunk], batch_size: usize) -> Result<usize> {
        let batch_size = batch_size.max(1);
        let mut stored = 0;

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let embeddings = self.embedder.embed_documents(&texts).await?;
            self.store.insert_chunks(batch, &embeddings).await?;
            stored += batch.len();
            debug!("Imported {}/{} chunks", stored, chunks.len());
        }

        info!("Imported {} chunks", stored);
        Ok(stored)
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        self.store.stats().await
    }

    /// Release the handle and flush the index to disk.
    pub fn shutdown(self) -> Result<()> {
        info!("Shutting down assistant");
        self.store.checkpoint()
    }
}
