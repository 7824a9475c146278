//! carnatic-models - Model providers
//!
//! This crate wraps the models the assistant talks to:
//!
//! - ONNX bi-encoder embeddings with mean pooling and L2 normalization
//! - ONNX cross-encoder relevance scoring for re-ranking
//! - An OpenAI-compatible chat completion client for answer generation
//! - Deterministic mocks of all three for tests and offline runs

mod chat;
mod cross_encoder;
mod encoding;
mod mock;
mod onnx;

pub use chat::ChatCompletionsClient;
pub use cross_encoder::OnnxCrossEncoder;
pub use mock::{MockEmbedder, MockLanguageModel, MockRelevanceModel};
pub use onnx::OnnxEmbedder;

// Re-export the provider traits for convenience
pub use carnatic_core::{Embedder, LanguageModel, RelevanceModel};
