//! ONNX-based embedding model implementation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::ArrayD;
use ort::session::Session;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use carnatic_core::{CarnaticError, Embedder, EmbeddingConfig, Result};

use crate::encoding::{self, PaddedBatch};

fn embedding_error(message: String) -> CarnaticError {
    CarnaticError::embedding(message)
}

/// ONNX-based embedder for sentence-transformers exports such as
/// all-MiniLM-L6-v2.
///
/// Inference runs on the blocking thread pool.
pub struct OnnxEmbedder {
    model: Arc<EmbeddingModel>,
}

/// Session and settings shared with blocking inference tasks.
struct EmbeddingModel {
    /// ONNX inference session (wrapped in Mutex for interior mutability).
    session: Mutex<Session>,

    /// Tokenizer for the model.
    tokenizer: Tokenizer,

    /// Embedding dimension.
    dimension: usize,

    /// Maximum token count.
    max_tokens: usize,

    /// Whether the model takes `token_type_ids`.
    token_type_ids: bool,
}

impl OnnxEmbedder {
    /// Load the embedder described by `config`.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (session, tokenizer) = encoding::load_model(
            &config.model_path,
            &config.tokenizer_path,
            config.num_threads,
            embedding_error,
        )?;

        info!(
            "Embedder initialized: dim={}, max_tokens={}",
            config.dimension, config.max_tokens
        );

        Ok(Self {
            model: Arc::new(EmbeddingModel {
                session: Mutex::new(session),
                tokenizer,
                dimension: config.dimension,
                max_tokens: config.max_tokens,
                token_type_ids: config.token_type_ids,
            }),
        })
    }

    async fn embed_owned(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        encoding::offload(move || model.embed_batch(&texts), embedding_error).await
    }
}

impl EmbeddingModel {
    /// Embed a batch of texts. Blocks on the session.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| CarnaticError::embedding(format!("Tokenization failed: {}", e)))?;

        let batch = PaddedBatch::from_encodings(&encodings, self.max_tokens);

        debug!(
            "Embedding batch: size={}, max_len={}",
            batch.batch_size, batch.seq_len
        );

        let output = encoding::run(&self.session, &batch, self.token_type_ids, embedding_error)?;
        let shape_dims = output.shape().to_vec();

        // Handle different output shapes
        let embeddings: Vec<Vec<f32>> = if shape_dims.len() == 3 {
            // (batch_size, seq_len, hidden_dim) - need mean pooling
            mean_pool(&output, &batch)
        } else if shape_dims.len() == 2 {
            // (batch_size, hidden_dim) - already pooled
            let hidden_dim = shape_dims[1];
            (0..batch.batch_size)
                .map(|i| l2_normalize((0..hidden_dim).map(|j| output[[i, j]]).collect()))
                .collect()
        } else {
            return Err(CarnaticError::embedding(format!(
                "Unexpected output shape: {:?}",
                shape_dims
            )));
        };

        if let Some(e) = embeddings.iter().find(|e| e.len() != self.dimension) {
            return Err(CarnaticError::embedding(format!(
                "Model produced dimension {}, configured {}",
                e.len(),
                self.dimension
            )));
        }

        Ok(embeddings)
    }
}

/// Mean pooling over the sequence dimension, weighted by the attention mask.
fn mean_pool(tensor: &ArrayD<f32>, batch: &PaddedBatch) -> Vec<Vec<f32>> {
    let shape = tensor.shape();
    let seq_len = shape[1].min(batch.seq_len);
    let hidden_dim = shape[2];

    (0..batch.batch_size)
        .map(|i| {
            let mask = batch.mask_row(i);
            let valid = mask.iter().take(seq_len).filter(|&&m| m == 1).count();
            if valid == 0 {
                return vec![0.0; hidden_dim];
            }

            let mut sum = vec![0.0f32; hidden_dim];
            for j in 0..seq_len {
                if mask[j] != 1 {
                    continue;
                }
                for (k, s) in sum.iter_mut().enumerate() {
                    *s += tensor[[i, j, k]];
                }
            }

            l2_normalize(sum.into_iter().map(|s| s / valid as f32).collect())
        })
        .collect()
}

/// L2 normalize a vector.
pub(crate) fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.embed_owned(texts.iter().map(|t| t.to_string()).collect())
            .await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_owned(vec![text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| CarnaticError::embedding("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.model.dimension
    }

    fn max_tokens(&self) -> usize {
        self.model.max_tokens
    }
}
