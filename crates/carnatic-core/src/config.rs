//! Configuration types for the Carnatic music assistant.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CarnaticError, Result};
use crate::types::{Category, ToolId};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Embedding model configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Cross-encoder configuration.
    #[serde(default)]
    pub reranker: RerankerConfig,

    /// Language model configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval stage sizes and timeouts.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Keyword rule table for tool selection.
    #[serde(default)]
    pub selection: SelectionConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Enable WAL mode (recommended).
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// SQLite cache size in KB (negative = KB, positive = pages).
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            wal_mode: true,
            cache_size: -64000, // 64MB
            busy_timeout_ms: 30000,
        }
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Path to the ONNX model file.
    #[serde(default = "default_embedding_model")]
    pub model_path: PathBuf,

    /// Path to tokenizer.json.
    #[serde(default = "default_embedding_tokenizer")]
    pub tokenizer_path: PathBuf,

    /// Embedding dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum tokens per input.
    #[serde(default = "default_embedding_max_tokens")]
    pub max_tokens: usize,

    /// Batch size for document embedding.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    /// Feed `token_type_ids` to the model (BERT-style exports need it).
    #[serde(default = "default_true")]
    pub token_type_ids: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: default_embedding_model(),
            tokenizer_path: default_embedding_tokenizer(),
            dimension: 384,
            max_tokens: 256,
            batch_size: 32,
            num_threads: 4,
            token_type_ids: true,
        }
    }
}

/// Cross-encoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Path to the ONNX model file.
    #[serde(default = "default_reranker_model")]
    pub model_path: PathBuf,

    /// Path to tokenizer.json.
    #[serde(default = "default_reranker_tokenizer")]
    pub tokenizer_path: PathBuf,

    /// Maximum tokens per (query, passage) pair.
    #[serde(default = "default_reranker_max_tokens")]
    pub max_tokens: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    /// Feed `token_type_ids` to the model.
    #[serde(default = "default_true")]
    pub token_type_ids: bool,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            model_path: default_reranker_model(),
            tokenizer_path: default_reranker_tokenizer(),
            max_tokens: 512,
            num_threads: 4,
            token_type_ids: true,
        }
    }
}

/// Language model configuration (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API base URL.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model name.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            request_timeout_secs: 60,
        }
    }
}

/// Retrieval stage sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates fetched from the index per category tool call.
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,

    /// Chunks kept after re-ranking in a category tool.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Upper bound of the final cross-category re-rank in fusion.
    #[serde(default = "default_fusion_top_k")]
    pub fusion_top_k: usize,

    /// Characters of chunk text included in tool output.
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,

    /// Per-call timeout for embedding, index search and re-ranking.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fetch_k: 12,
            top_k: 6,
            fusion_top_k: 8,
            snippet_chars: 800,
            timeout_ms: 30000,
        }
    }
}

/// A keyword rule: if any keyword occurs in the question, select the tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRule {
    pub tool: ToolId,
    pub keywords: Vec<String>,
}

impl SelectionRule {
    fn new(tool: ToolId, keywords: &[&str]) -> Self {
        Self {
            tool,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Tool selection policy as data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Rules evaluated in order; each contributes at most one tool.
    #[serde(default = "default_rules")]
    pub rules: Vec<SelectionRule>,

    /// Phrase that triggers fusion on its own.
    #[serde(default = "default_fusion_phrase")]
    pub fusion_phrase: String,

    /// Categories the fusion tool is invoked with.
    #[serde(default = "Category::all_ids")]
    pub fusion_categories: Vec<String>,

    /// Per-category result count for fusion.
    #[serde(default = "default_fusion_k_each")]
    pub fusion_k_each: usize,

    /// Tool used when nothing matched.
    #[serde(default = "default_tool")]
    pub default_tool: ToolId,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            fusion_phrase: default_fusion_phrase(),
            fusion_categories: Category::all_ids(),
            fusion_k_each: 4,
            default_tool: ToolId::KnowledgeTool,
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_cache_size() -> i32 {
    -64000
}

fn default_busy_timeout() -> u32 {
    30000
}

fn default_dimension() -> usize {
    384
}

fn default_embedding_max_tokens() -> usize {
    256
}

fn default_reranker_max_tokens() -> usize {
    512
}

fn default_batch_size() -> usize {
    32
}

fn default_num_threads() -> usize {
    4
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_llm_model() -> String {
    "llama3-8b-8192".to_string()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_fetch_k() -> usize {
    12
}

fn default_top_k() -> usize {
    6
}

fn default_fusion_top_k() -> usize {
    8
}

fn default_snippet_chars() -> usize {
    800
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_fusion_phrase() -> String {
    "carnatic music".to_string()
}

fn default_fusion_k_each() -> usize {
    4
}

fn default_tool() -> ToolId {
    ToolId::KnowledgeTool
}

fn default_rules() -> Vec<SelectionRule> {
    vec![
        SelectionRule::new(
            ToolId::KnowledgeTool,
            &["what is", "explain", "theory", "literature", "raga", "scale", "prayoga"],
        ),
        SelectionRule::new(
            ToolId::RagaIndexTool,
            &["raga", "melakarta", "janya", "alias", "list", "number"],
        ),
        SelectionRule::new(
            ToolId::KrithiTool,
            &["krithi", "kriti", "composition", "lyrics", "composer", "tala", "song"],
        ),
    ]
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("carnatic")
}

fn default_database_path() -> PathBuf {
    data_dir().join("index.db")
}

fn default_embedding_model() -> PathBuf {
    data_dir().join("models").join("all-MiniLM-L6-v2").join("model.onnx")
}

fn default_embedding_tokenizer() -> PathBuf {
    data_dir().join("models").join("all-MiniLM-L6-v2").join("tokenizer.json")
}

fn default_reranker_model() -> PathBuf {
    data_dir().join("models").join("ms-marco-MiniLM-L-6-v2").join("model.onnx")
}

fn default_reranker_tokenizer() -> PathBuf {
    data_dir().join("models").join("ms-marco-MiniLM-L-6-v2").join("tokenizer.json")
}

impl AssistantConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CarnaticError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("carnatic").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("carnatic.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Check stage sizes and the selection table for consistency.
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        if r.fetch_k == 0 || r.top_k == 0 || r.fusion_top_k == 0 {
            return Err(CarnaticError::config("retrieval sizes must be greater than zero"));
        }
        if r.top_k > r.fetch_k {
            return Err(CarnaticError::config(format!(
                "retrieval.top_k ({}) exceeds retrieval.fetch_k ({})",
                r.top_k, r.fetch_k
            )));
        }
        if r.snippet_chars == 0 {
            return Err(CarnaticError::config("retrieval.snippet_chars must be greater than zero"));
        }
        if self.selection.fusion_k_each == 0 {
            return Err(CarnaticError::config("selection.fusion_k_each must be greater than zero"));
        }
        if self.selection.default_tool == ToolId::MultiSearch {
            return Err(CarnaticError::config("selection.default_tool must be a single-category tool"));
        }
        Ok(())
    }
}
