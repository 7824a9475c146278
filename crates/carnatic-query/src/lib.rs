//! carnatic-query - Retrieval and re-ranking engine
//!
//! This crate turns a question into ranked passages:
//!
//! - Keyword-driven tool selection from a configurable rule table
//! - Category-filtered similarity search over the embedded index
//! - Cross-encoder re-ranking with graceful degradation
//! - Multi-category fusion with a second, global re-ranking pass
//! - Plain-text formatting for the answer composer
//!
//! # Example
//!
//! ```rust,ignore
//! use carnatic_query::{CategorySearchTool, RetrievalContext, SemanticIndex};
//! use std::sync::Arc;
//!
//! let index = SemanticIndex::new(Arc::new(store), Arc::new(embedder), timeout);
//! let ctx = RetrievalContext::new(Arc::new(index), Arc::new(cross_encoder), config);
//! let tool = CategorySearchTool::from_config(ToolId::RagaIndexTool, ctx.config())?;
//! let outcome = tool.search(&ctx, "melakarta of Kalyani").await;
//! ```

mod context;
mod format;
mod fusion;
mod index;
mod rerank;
mod select;
mod tools;

#[cfg(test)]
mod testing;

pub use context::RetrievalContext;
pub use format::{format_chunks, NO_RESULTS};
pub use fusion::MultiSearchTool;
pub use index::SemanticIndex;
pub use rerank::{Reranked, Reranker};
pub use select::ToolSelector;
pub use tools::CategorySearchTool;

// Re-export for convenience
pub use carnatic_core::{RetrievalOutcome, ScoredChunk, ToolCall, ToolId, ToolParams};
