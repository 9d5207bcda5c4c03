/// BERT-style tokenizer wrapper around HuggingFace `tokenizers`.
///
/// Batches are padded to their longest member so they can be fed to the
/// ONNX session as a single `[batch, seq_len]` tensor.
use std::path::Path;

use anyhow::Result;
use tokenizers::{Encoding, PaddingParams, Tokenizer, TruncationParams};

/// Maximum sequence length of the e5 family (XLM-RoBERTa positions).
pub const MAX_SEQ_LEN: usize = 512;

pub struct BertTokenizer {
    inner: Tokenizer,
}

/// A padded batch, flattened row-major.
#[derive(Debug, Clone)]
pub struct TokenBatch {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub batch_size: usize,
    pub seq_len: usize,
}

impl BertTokenizer {
    /// Load `tokenizer.json` from the model directory.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {}",
            model_dir.display()
        );

        let mut inner = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        inner
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to configure truncation: {e}"))?;
        inner.with_padding(Some(PaddingParams::default()));

        Ok(Self { inner })
    }

    /// Tokenize texts into one padded batch.
    pub fn tokenize_batch(&self, texts: &[&str]) -> Result<TokenBatch> {
        let encodings = self
            .inner
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("failed to encode batch: {e}"))?;

        Ok(flatten(&encodings))
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }
}

fn flatten(encodings: &[Encoding]) -> TokenBatch {
    let seq_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);
    let mut input_ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut attention_mask = Vec::with_capacity(encodings.len() * seq_len);

    for enc in encodings {
        input_ids.extend(enc.get_ids().iter().map(|&id| id as i64));
        attention_mask.extend(enc.get_attention_mask().iter().map(|&m| m as i64));
        // Padding already equalises lengths; this only guards odd configs
        let missing = seq_len - enc.len();
        input_ids.extend(std::iter::repeat_n(0, missing));
        attention_mask.extend(std::iter::repeat_n(0, missing));
    }

    TokenBatch {
        input_ids,
        attention_mask,
        batch_size: encodings.len(),
        seq_len,
    }
}
