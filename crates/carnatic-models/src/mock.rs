//! Deterministic stand-ins for the model providers.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use carnatic_core::{CarnaticError, Embedder, LanguageModel, RelevanceModel, Result};

use crate::encoding;
use crate::onnx::l2_normalize;

/// Lowercased alphanumeric terms of `text`.
fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// FNV-1a, so identical terms land in the same bucket across runs.
fn fnv1a(term: &str) -> u64 {
    term.bytes().fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
        (acc ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// A mock embedder for testing that doesn't require actual models.
///
/// Uses feature hashing over terms, so texts sharing words are close.
pub struct MockEmbedder {
    dimension: usize,
    max_tokens: usize,
}

impl MockEmbedder {
    /// Create a new mock embedder with default settings.
    pub fn new() -> Self {
        Self {
            dimension: 384,
            max_tokens: 256,
        }
    }

    /// Create a mock embedder with custom settings.
    pub fn with_config(dimension: usize, max_tokens: usize) -> Self {
        Self {
            dimension,
            max_tokens,
        }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        if self.dimension == 0 {
            return Vec::new();
        }
        let mut embedding = vec![0.0f32; self.dimension];
        for term in terms(text) {
            let bucket = (fnv1a(&term) % self.dimension as u64) as usize;
            embedding[bucket] += 1.0;
        }
        l2_normalize(embedding)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }
}

/// How a mock call spends its time before answering.
#[derive(Debug, Clone, Copy)]
enum Stall {
    None,
    /// Yields to the runtime while waiting.
    Sleep(Duration),
    /// Holds a blocking-pool thread, like ONNX inference does.
    Block(Duration),
}

/// Term-overlap relevance model.
///
/// Scores a pair by the fraction of distinct query terms found in the
/// candidate. Can be told to fail or to stall, and counts its calls.
pub struct MockRelevanceModel {
    fail: bool,
    stall: Stall,
    calls: AtomicUsize,
}

impl MockRelevanceModel {
    pub fn new() -> Self {
        Self {
            fail: false,
            stall: Stall::None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A model whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// A model that sleeps before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            stall: Stall::Sleep(delay),
            ..Self::new()
        }
    }

    /// A model that scores on a blocking thread which sleeps for `delay`
    /// first.
    pub fn blocking(delay: Duration) -> Self {
        Self {
            stall: Stall::Block(delay),
            ..Self::new()
        }
    }

    /// Number of `predict` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn score(query: &str, candidate: &str) -> f32 {
        let wanted: HashSet<String> = terms(query).collect();
        if wanted.is_empty() {
            return 0.0;
        }
        let present: HashSet<String> = terms(candidate).collect();
        wanted.intersection(&present).count() as f32 / wanted.len() as f32
    }
}

impl Default for MockRelevanceModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelevanceModel for MockRelevanceModel {
    async fn predict(&self, pairs: &[(&str, &str)]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let fail = self.fail;
        let score_all = move |pairs: Vec<(String, String)>| -> Result<Vec<f32>> {
            if fail {
                return Err(CarnaticError::rerank("mock relevance model failure"));
            }
            Ok(pairs.iter().map(|(q, c)| Self::score(q, c)).collect())
        };
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(q, c)| (q.to_string(), c.to_string()))
            .collect();

        match self.stall {
            Stall::None => score_all(pairs),
            Stall::Sleep(delay) => {
                tokio::time::sleep(delay).await;
                score_all(pairs)
            }
            Stall::Block(delay) => {
                encoding::offload(
                    move || {
                        std::thread::sleep(delay);
                        score_all(pairs)
                    },
                    |m| CarnaticError::rerank(m),
                )
                .await
            }
        }
    }
}

/// Scripted language model that records every prompt it receives.
pub struct MockLanguageModel {
    responses: Mutex<VecDeque<Result<String>>>,
    fallback: String,
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl MockLanguageModel {
    /// A model that always answers `reply`.
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: reply.into(),
            fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A model that returns `responses` in order, then the fallback reply.
    pub fn scripted(responses: Vec<Result<String>>, fallback: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::new(fallback)
        }
    }

    /// A model whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if self.fail {
            return Err(CarnaticError::upstream("mock language model unreachable"));
        }

        let next = self
            .responses
            .lock()
            .map_err(|e| CarnaticError::internal(e.to_string()))?
            .pop_front();

        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
