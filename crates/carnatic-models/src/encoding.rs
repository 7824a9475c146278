//! Shared ONNX plumbing: session loading, padding and inference.

use std::path::Path;
use std::sync::Mutex;

use ndarray::ArrayD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer};
use tracing::{debug, info};

use carnatic_core::{CarnaticError, Result};

/// Maps a message to the error variant of the calling model.
pub(crate) type ErrorFn = fn(String) -> CarnaticError;

/// Load an ONNX session and its tokenizer.
pub(crate) fn load_model(
    model_path: &Path,
    tokenizer_path: &Path,
    num_threads: usize,
    err: ErrorFn,
) -> Result<(Session, Tokenizer)> {
    info!("Loading ONNX model from {:?}", model_path);

    let session = Session::builder()
        .map_err(|e| err(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| err(format!("Failed to set optimization level: {}", e)))?
        .with_intra_threads(num_threads.max(1))
        .map_err(|e| err(format!("Failed to set thread count: {}", e)))?
        .commit_from_file(model_path)
        .map_err(|e| err(format!("Failed to load model: {}", e)))?;

    info!("Loading tokenizer from {:?}", tokenizer_path);

    let tokenizer = Tokenizer::from_file(tokenizer_path)
        .map_err(|e| err(format!("Failed to load tokenizer: {}", e)))?;

    Ok((session, tokenizer))
}

/// Run blocking model work on the blocking thread pool so the calling task
/// stays cancellable while inference is in flight.
pub(crate) async fn offload<T, F>(work: F, err: ErrorFn) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| err(format!("Inference task failed: {}", e)))?
}

/// Row-major, zero-padded model inputs for one batch.
pub(crate) struct PaddedBatch {
    pub batch_size: usize,
    pub seq_len: usize,
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl PaddedBatch {
    /// Pad (and truncate to `max_tokens`) a batch of encodings.
    pub fn from_encodings(encodings: &[Encoding], max_tokens: usize) -> Self {
        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(max_tokens);

        let batch_size = encodings.len();
        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];
        let mut token_type_ids = vec![0i64; batch_size * seq_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();
            let len = ids.len().min(seq_len);

            for j in 0..len {
                input_ids[i * seq_len + j] = ids[j] as i64;
                attention_mask[i * seq_len + j] = mask[j] as i64;
                token_type_ids[i * seq_len + j] = types.get(j).copied().unwrap_or(0) as i64;
            }
        }

        Self {
            batch_size,
            seq_len,
            input_ids,
            attention_mask,
            token_type_ids,
        }
    }

    /// Attention mask of row `i`.
    pub fn mask_row(&self, i: usize) -> &[i64] {
        &self.attention_mask[i * self.seq_len..(i + 1) * self.seq_len]
    }
}

/// Run the session on a padded batch and return its first output.
pub(crate) fn run(
    session: &Mutex<Session>,
    batch: &PaddedBatch,
    with_token_types: bool,
    err: ErrorFn,
) -> Result<ArrayD<f32>> {
    let shape = vec![batch.batch_size, batch.seq_len];

    let input_ids = Tensor::from_array((shape.clone(), batch.input_ids.clone()))
        .map_err(|e| err(format!("Failed to create input tensor: {}", e)))?;
    let attention_mask = Tensor::from_array((shape.clone(), batch.attention_mask.clone()))
        .map_err(|e| err(format!("Failed to create mask tensor: {}", e)))?;

    let mut session = session
        .lock()
        .map_err(|e| err(format!("Failed to lock session: {}", e)))?;

    let outputs = if with_token_types {
        let token_type_ids = Tensor::from_array((shape, batch.token_type_ids.clone()))
            .map_err(|e| err(format!("Failed to create token type tensor: {}", e)))?;
        session.run(ort::inputs![
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
            "token_type_ids" => token_type_ids
        ])
    } else {
        session.run(ort::inputs![
            "input_ids" => input_ids,
            "attention_mask" => attention_mask
        ])
    }
    .map_err(|e| err(format!("Inference failed: {}", e)))?;

    // Different exports name their outputs differently; take the first.
    let (name, output) = outputs
        .iter()
        .next()
        .ok_or_else(|| err("No output tensor found".to_string()))?;

    let view = output
        .try_extract_array::<f32>()
        .map_err(|e| err(format!("Failed to extract tensor: {}", e)))?;

    debug!("Output {} shape: {:?}", name, view.shape());

    Ok(view.to_owned())
}
