//! ONNX cross-encoder for pairwise relevance scoring.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::ArrayD;
use ort::session::Session;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use carnatic_core::{CarnaticError, RelevanceModel, RerankerConfig, Result};

use crate::encoding::{self, PaddedBatch};

fn rerank_error(message: String) -> CarnaticError {
    CarnaticError::rerank(message)
}

/// Cross-encoder such as cross-encoder/ms-marco-MiniLM-L-6-v2.
///
/// Each `(query, passage)` pair is encoded jointly and the model's logit is
/// used as the relevance score. Scoring runs on the blocking thread pool.
pub struct OnnxCrossEncoder {
    model: Arc<CrossEncoderModel>,
}

struct CrossEncoderModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_tokens: usize,
    token_type_ids: bool,
}

impl OnnxCrossEncoder {
    /// Load the cross-encoder described by `config`.
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let (session, tokenizer) = encoding::load_model(
            &config.model_path,
            &config.tokenizer_path,
            config.num_threads,
            rerank_error,
        )?;

        info!("Cross-encoder initialized: max_tokens={}", config.max_tokens);

        Ok(Self {
            model: Arc::new(CrossEncoderModel {
                session: Mutex::new(session),
                tokenizer,
                max_tokens: config.max_tokens,
                token_type_ids: config.token_type_ids,
            }),
        })
    }
}

impl CrossEncoderModel {
    /// Score a batch of pairs. Blocks on the session.
    fn score_batch(&self, pairs: Vec<(String, String)>) -> Result<Vec<f32>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let expected = pairs.len();

        let encodings = self
            .tokenizer
            .encode_batch(pairs, true)
            .map_err(|e| CarnaticError::rerank(format!("Tokenization failed: {}", e)))?;

        let batch = PaddedBatch::from_encodings(&encodings, self.max_tokens);
        debug!("Scoring {} pairs, max_len={}", batch.batch_size, batch.seq_len);

        let logits = encoding::run(&self.session, &batch, self.token_type_ids, rerank_error)?;
        logits_to_scores(&logits, expected)
    }
}

/// Take one score per row: `[batch]`, `[batch, 1]`, or the last column of
/// `[batch, n]` (positive class of a classification head).
fn logits_to_scores(logits: &ArrayD<f32>, expected: usize) -> Result<Vec<f32>> {
    let shape = logits.shape();
    let scores: Vec<f32> = match shape.len() {
        1 => logits.iter().copied().collect(),
        2 => {
            let last = shape[1].checked_sub(1).ok_or_else(|| {
                CarnaticError::rerank(format!("Unexpected output shape: {:?}", shape))
            })?;
            (0..shape[0]).map(|i| logits[[i, last]]).collect()
        }
        _ => {
            return Err(CarnaticError::rerank(format!(
                "Unexpected output shape: {:?}",
                shape
            )))
        }
    };

    if scores.len() != expected {
        return Err(CarnaticError::rerank(format!(
            "Model returned {} scores for {} pairs",
            scores.len(),
            expected
        )));
    }

    Ok(scores)
}

#[async_trait]
impl RelevanceModel for OnnxCrossEncoder {
    async fn predict(&self, pairs: &[(&str, &str)]) -> Result<Vec<f32>> {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(q, p)| (q.to_string(), p.to_string()))
            .collect();
        let model = Arc::clone(&self.model);
        encoding::offload(move || model.score_batch(pairs), rerank_error).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_logits_single_column() {
        let logits = ArrayD::from_shape_vec(IxDyn(&[3, 1]), vec![0.5, -1.0, 2.0]).unwrap();
        assert_eq!(logits_to_scores(&logits, 3).unwrap(), vec![0.5, -1.0, 2.0]);
    }

    #[test]
    fn test_logits_two_columns_takes_positive_class() {
        let logits = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![0.1, 0.9, 0.8, 0.2]).unwrap();
        assert_eq!(logits_to_scores(&logits, 2).unwrap(), vec![0.9, 0.2]);
    }

    #[test]
    fn test_logits_count_mismatch() {
        let logits = ArrayD::from_shape_vec(IxDyn(&[2]), vec![0.1, 0.9]).unwrap();
        let err = logits_to_scores(&logits, 3).unwrap_err();
        assert_eq!(err.error_code(), "RERANK_ERROR");
    }
}
