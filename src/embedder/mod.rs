/// Embedder trait, shared types, and model selection.
///
/// The e5 model family expects queries and passages to carry a role prefix;
/// [`Embedder::embed_query`] and [`Embedder::embed_passages`] apply them.
pub mod download;
pub mod mock;
pub mod onnx;
pub mod tokenizer;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),
}

/// Trait for text embedding implementations.
///
/// Implementations are shared behind `Arc` between the indexer and the
/// request handlers, hence `Send + Sync`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;

    /// Model identifier. Vectors from embedders with different names are
    /// not comparable.
    fn name(&self) -> &str;

    /// `name:dimensions`, recorded with an index to detect a model change.
    fn signature(&self) -> String {
        format!("{}:{}", self.name(), self.dimensions())
    }

    /// Embed a search query.
    fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbedderError> {
        self.embed(&format!("query: {query}"))
    }

    /// Embed document passages for indexing.
    fn embed_passages(&self, passages: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let prefixed: Vec<String> = passages.iter().map(|p| format!("passage: {p}")).collect();
        let refs: Vec<&str> = prefixed.iter().map(String::as_str).collect();
        self.embed_batch(&refs)
    }
}

/// Build the embedder described by `config`.
///
/// Downloads missing model files when `model.auto_download` is set. If the
/// ONNX model cannot be prepared and `model.allow_mock` is set, falls back to
/// [`mock::MockEmbedder`]. Performs blocking I/O; call from a blocking context.
pub fn load_embedder(config: &Config) -> anyhow::Result<Arc<dyn Embedder>> {
    let model_dir = Path::new(&config.model.dir);

    let prepared = if config.model.auto_download {
        download::download_model_files(model_dir, &config.model.name)
    } else {
        Ok(())
    };

    let loaded = prepared.map_err(|e| EmbedderError::ModelLoadFailed(format!("{e:#}"))).and_then(
        |()| {
            onnx::OnnxEmbedder::new(
                model_dir,
                config.model.dimensions,
                config.compute.intra_threads,
            )
            .map(|embedder| embedder.with_name(&config.model.name))
        },
    );

    match loaded {
        Ok(embedder) => {
            info!("Using ONNX embedder ({})", config.model.name);
            Ok(Arc::new(embedder))
        }
        Err(e) if config.model.allow_mock => {
            warn!("ONNX embedder unavailable ({e}); falling back to hashing embedder");
            Ok(Arc::new(mock::MockEmbedder::new(config.model.dimensions)))
        }
        Err(e) => Err(e.into()),
    }
}
