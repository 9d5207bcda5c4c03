/// ONNX Runtime embedder using the `ort` crate.
///
/// Runs a multilingual-e5-small export on padded batches, mean-pools the
/// last hidden state under the attention mask, and L2-normalizes each row.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::tokenizer::{BertTokenizer, TokenBatch};
use super::{Embedder, EmbedderError};

/// Texts per inference call; bounds the padded tensor size.
const BATCH_SIZE: usize = 16;

pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: BertTokenizer,
    dimensions: usize,
    name: String,
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn new(
        model_dir: &Path,
        dimensions: usize,
        intra_threads: usize,
    ) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");

        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        info!("Initializing ONNX Runtime ({intra_threads} intra-op threads)...");

        let session = Session::builder()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("session builder error: {e}")))?
            .with_intra_threads(intra_threads.max(1))
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("thread config error: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("model load error: {e}")))?;

        let tokenizer = BertTokenizer::from_model_dir(model_dir)
            .map_err(|e| EmbedderError::TokenizerError(format!("{e:#}")))?;

        info!(
            "ONNX model loaded (vocab size: {}, dimensions: {dimensions})",
            tokenizer.vocab_size()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
            name: "onnx".to_string(),
        })
    }

    /// Name the loaded model, e.g. `intfloat/multilingual-e5-small`.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    fn run_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let batch = self
            .tokenizer
            .tokenize_batch(texts)
            .map_err(|e| EmbedderError::TokenizerError(format!("{e:#}")))?;
        let TokenBatch {
            input_ids,
            attention_mask,
            batch_size,
            seq_len,
        } = batch;

        let shape = [batch_size, seq_len];
        let input_ids_val = Tensor::from_array((shape, input_ids))
            .map_err(|e| EmbedderError::InferenceFailed(format!("input_ids error: {e}")))?;
        let attention_mask_val = Tensor::from_array((shape, attention_mask.clone()))
            .map_err(|e| EmbedderError::InferenceFailed(format!("attention_mask error: {e}")))?;
        let token_type_ids_val = Tensor::from_array((shape, vec![0i64; batch_size * seq_len]))
            .map_err(|e| EmbedderError::InferenceFailed(format!("token_type_ids error: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_val,
                "attention_mask" => attention_mask_val,
                "token_type_ids" => token_type_ids_val,
            ])
            .map_err(|e| EmbedderError::InferenceFailed(format!("inference failed: {e}")))?;

        // Output shape: [batch_size, seq_len, hidden_size]
        let (_shape, hidden) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;

        let expected = batch_size * seq_len * self.dimensions;
        if hidden.len() != expected {
            return Err(EmbedderError::InferenceFailed(format!(
                "unexpected output size {} (expected {expected}); check model.dimensions",
                hidden.len()
            )));
        }

        let row_len = seq_len * self.dimensions;
        Ok((0..batch_size)
            .map(|b| {
                let pooled = mean_pooling(
                    &hidden[b * row_len..(b + 1) * row_len],
                    &attention_mask[b * seq_len..(b + 1) * seq_len],
                    self.dimensions,
                );
                l2_normalize(&pooled)
            })
            .collect())
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.run_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("empty output batch".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for group in texts.chunks(BATCH_SIZE) {
            debug!("Embedding batch of {}", group.len());
            vectors.extend(self.run_batch(group)?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Mean pooling of one sequence's hidden states weighted by its attention mask.
///
/// `hidden` is the flat `[seq_len, hidden_size]` slice for a single row.
fn mean_pooling(hidden: &[f32], attention_mask: &[i64], hidden_size: usize) -> Vec<f32> {
    let mut result = vec![0.0f32; hidden_size];
    let mut mask_sum = 0.0f32;

    for (token, &mask) in hidden.chunks(hidden_size).zip(attention_mask) {
        if mask == 0 {
            continue;
        }
        mask_sum += mask as f32;
        for (acc, value) in result.iter_mut().zip(token) {
            *acc += value * mask as f32;
        }
    }

    if mask_sum > 0.0 {
        for v in &mut result {
            *v /= mask_sum;
        }
    }

    result
}

/// L2-normalize a vector, returning the normalized copy.
fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq == 0.0 {
        return vec.to_vec();
    }

    let inv_norm = 1.0 / norm_sq.sqrt();
    vec.iter().map(|v| v * inv_norm).collect()
}
