//! Core domain types for the Carnatic music assistant.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{CarnaticError, Result};

/// Subject area a chunk belongs to. Every chunk carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Music theory and literature: ragas, scales, prayogas.
    Literature,
    /// Raga index: canonical names, aliases, melakarta mapping.
    Raga,
    /// Compositions: lyrics, composer, tala, explanations.
    Krithis,
}

impl Category {
    /// All categories in canonical order.
    pub const ALL: [Category; 3] = [Category::Literature, Category::Raga, Category::Krithis];

    /// Identifier stored in chunk metadata and used as the index filter.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Literature => "Literature",
            Self::Raga => "Raga",
            Self::Krithis => "Krithis",
        }
    }

    /// Human-readable topic label attached to chunks at ingestion.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Literature => "Carnatic Music Theory",
            Self::Raga => "Carnatic Raga",
            Self::Krithis => "Carnatic Krithis",
        }
    }

    /// Look up a category by its exact metadata identifier.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.id() == id)
    }

    /// Identifiers of every category, in canonical order.
    pub fn all_ids() -> Vec<String> {
        Self::ALL.iter().map(|c| c.id().to_string()).collect()
    }
}

impl FromStr for Category {
    type Err = CarnaticError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CarnaticError::invalid_argument(format!("unknown category: {}", s)))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Metadata attached to a chunk at ingestion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Category identifier (see [`Category::id`]).
    pub category: String,

    /// Source file or URI the chunk was cut from.
    #[serde(alias = "source_file", default)]
    pub source: String,

    /// Position of the chunk within its source.
    #[serde(default)]
    pub page_num: Option<u32>,

    /// Topic label of the category.
    #[serde(default)]
    pub topic: Option<String>,
}

impl ChunkMetadata {
    /// Metadata for a chunk of a known category, with its topic label filled in.
    pub fn for_category(category: Category, source: &str) -> Self {
        Self {
            category: category.id().to_string(),
            source: source.to_string(),
            page_num: None,
            topic: Some(category.topic().to_string()),
        }
    }

    /// Set the page number.
    pub fn with_page(mut self, page_num: u32) -> Self {
        self.page_num = Some(page_num);
        self
    }
}

/// Immutable unit of retrieved content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier (ULID).
    pub id: Ulid,

    /// Chunk text content.
    pub content: String,

    /// Category and source metadata.
    pub metadata: ChunkMetadata,

    /// Blake3 hash of the content, used as content identity.
    #[serde(with = "serde_bytes_opt")]
    pub content_hash: Option<[u8; 32]>,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(content: &str, metadata: ChunkMetadata) -> Self {
        let content_hash = blake3::hash(content.as_bytes());

        Self {
            id: Ulid::new(),
            content: content.to_string(),
            metadata,
            content_hash: Some(*content_hash.as_bytes()),
        }
    }

    /// Category identifier, or `"?"` when missing.
    pub fn category(&self) -> &str {
        if self.metadata.category.is_empty() {
            "?"
        } else {
            &self.metadata.category
        }
    }

    /// Source identifier, or `"?"` when missing.
    pub fn source(&self) -> &str {
        if self.metadata.source.is_empty() {
            "?"
        } else {
            &self.metadata.source
        }
    }

    /// Hex-encoded content hash.
    pub fn content_hash_hex(&self) -> Option<String> {
        self.content_hash.map(hex::encode)
    }
}

/// A chunk paired with the relevance score of the last re-ranking pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The ranked chunk.
    pub chunk: Chunk,

    /// Relevance score (higher is more relevant).
    pub score: f32,
}

/// Identifier of a retrieval tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
    KnowledgeTool,
    RagaIndexTool,
    KrithiTool,
    MultiSearch,
}

impl ToolId {
    /// All tools, in the order they are listed to users.
    pub const ALL: [ToolId; 4] = [
        ToolId::KnowledgeTool,
        ToolId::RagaIndexTool,
        ToolId::KrithiTool,
        ToolId::MultiSearch,
    ];

    /// Tool name as shown in tool output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::KnowledgeTool => "knowledge_tool",
            Self::RagaIndexTool => "raga_index_tool",
            Self::KrithiTool => "krithi_tool",
            Self::MultiSearch => "multi_search",
        }
    }

    /// Short description of what the tool retrieves.
    pub fn description(&self) -> &'static str {
        match self {
            Self::KnowledgeTool => {
                "Retrieve Carnatic music theory & literature about ragas, scales, and prayogas."
            }
            Self::RagaIndexTool => "Lookup raga canonical info (aliases, melakarta mapping).",
            Self::KrithiTool => "Search compositions: lyrics, composer, tala, and explanations.",
            Self::MultiSearch => "Search across multiple categories for comprehensive results.",
        }
    }

    /// Category a single-category tool is bound to. `None` for the fusion tool.
    pub fn category(&self) -> Option<Category> {
        match self {
            Self::KnowledgeTool => Some(Category::Literature),
            Self::RagaIndexTool => Some(Category::Raga),
            Self::KrithiTool => Some(Category::Krithis),
            Self::MultiSearch => None,
        }
    }
}

impl FromStr for ToolId {
    type Err = CarnaticError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s.trim())
            .ok_or_else(|| CarnaticError::invalid_argument(format!("unknown tool: {}", s)))
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Parameters a tool is invoked with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolParams {
    /// Single-category search.
    Search { query: String },

    /// Multi-category fusion search.
    MultiSearch {
        query: String,
        categories: Vec<String>,
        k_each: usize,
    },
}

/// One entry of a tool selection: which tool, and how to call it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: ToolId,
    pub params: ToolParams,
}

/// Outcome of one retrieval tool call.
///
/// Separates "nothing matched" from "lookup failed" from "ranked without
/// the relevance model", so callers can decide how to present each.
#[derive(Debug)]
pub enum RetrievalOutcome {
    /// Chunks ordered by descending relevance score.
    Ranked(Vec<ScoredChunk>),

    /// Chunks in original candidate order; the relevance model failed.
    Degraded { chunks: Vec<Chunk>, reason: String },

    /// The lookup succeeded but returned nothing.
    NoResults,

    /// The lookup failed.
    Failed(CarnaticError),
}

impl RetrievalOutcome {
    /// Chunks in presentation order. Empty for `NoResults` and `Failed`.
    pub fn chunks(&self) -> Vec<&Chunk> {
        match self {
            Self::Ranked(scored) => scored.iter().map(|s| &s.chunk).collect(),
            Self::Degraded { chunks, .. } => chunks.iter().collect(),
            Self::NoResults | Self::Failed(_) => Vec::new(),
        }
    }

    /// Consume the outcome, returning its chunks in presentation order.
    pub fn into_chunks(self) -> Vec<Chunk> {
        match self {
            Self::Ranked(scored) => scored.into_iter().map(|s| s.chunk).collect(),
            Self::Degraded { chunks, .. } => chunks,
            Self::NoResults | Self::Failed(_) => Vec::new(),
        }
    }

    /// Number of chunks carried.
    pub fn len(&self) -> usize {
        match self {
            Self::Ranked(scored) => scored.len(),
            Self::Degraded { chunks, .. } => chunks.len(),
            Self::NoResults | Self::Failed(_) => 0,
        }
    }

    /// True when no chunks are carried.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Statistics about the vector index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of chunks.
    pub chunks: u64,

    /// Number of stored embeddings.
    pub embeddings: u64,

    /// Chunk count per category identifier.
    pub by_category: BTreeMap<String, u64>,

    /// Database size in bytes.
    pub storage_bytes: u64,

    /// Whether KNN runs on sqlite-vec or on the exact scan fallback.
    pub vector_backend: String,
}

/// Helper module for optional byte array serialization.
mod serde_bytes_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => {
                let hex = hex::encode(bytes);
                hex.serialize(serializer)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(hex) => {
                let bytes = hex::decode(&hex).map_err(serde::de::Error::custom)?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("invalid hash length"))?;
                Ok(Some(arr))
            }
            None => Ok(None),
        }
    }
}
