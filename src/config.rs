/// Configuration module for ragsearch.
///
/// Handles loading, validating, and providing default configuration values
/// for both document collections, the embedding model and the UI server.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::indexer::loaders::is_supported;

// ── Default value functions ──────────────────────────────────────────

fn default_text_collection() -> CollectionConfig {
    CollectionConfig {
        name: "HTML & CSS documents".to_string(),
        sources: vec!["./data/html_css".to_string()],
        db_path: "./vectorstores/text.db".to_string(),
    }
}

fn default_pmjay_collection() -> CollectionConfig {
    CollectionConfig {
        name: "PM-JAY multimodal documents".to_string(),
        sources: vec!["./data/pmjay".to_string()],
        db_path: "./vectorstores/pmjay.db".to_string(),
    }
}

fn default_image_store() -> String {
    "image_store_pmjay".to_string()
}

fn default_chunk_size() -> usize {
    500
}

fn default_search_top_k() -> usize {
    5
}

fn default_max_top_k() -> usize {
    10
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

fn default_true() -> bool {
    true
}

fn default_threads() -> usize {
    4
}

fn default_model_name() -> String {
    "multilingual-e5-small".to_string()
}

fn default_model_dir() -> String {
    "models/multilingual-e5-small".to_string()
}

fn default_dimensions() -> usize {
    384
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_text_collection")]
    pub text: CollectionConfig,

    #[serde(default = "default_pmjay_collection")]
    pub pmjay: CollectionConfig,

    /// Directory holding images extracted from PM-JAY PDFs.
    #[serde(default = "default_image_store")]
    pub image_store: String,

    /// Start loading the PM-JAY store in the background when the server starts.
    #[serde(default = "default_true")]
    pub load_pmjay_on_startup: bool,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub compute: ComputeConfig,

    #[serde(default)]
    pub model: ModelConfig,
}

/// One document collection: where its sources live and where its index is persisted.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CollectionConfig {
    /// Display name shown above search results.
    pub name: String,
    /// Directories, files or glob patterns of source documents.
    pub sources: Vec<String>,
    pub db_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ComputeConfig {
    #[serde(default = "default_threads")]
    pub intra_threads: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_model_dir")]
    pub dir: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Fetch missing model files from HuggingFace on startup.
    #[serde(default = "default_true")]
    pub auto_download: bool,

    /// Fall back to the hashing embedder when the ONNX model cannot be loaded.
    #[serde(default = "default_true")]
    pub allow_mock: bool,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            text: default_text_collection(),
            pmjay: default_pmjay_collection(),
            image_store: default_image_store(),
            load_pmjay_on_startup: default_true(),
            chunk_size: default_chunk_size(),
            search_top_k: default_search_top_k(),
            max_top_k: default_max_top_k(),
            server: ServerConfig::default(),
            compute: ComputeConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            intra_threads: default_threads(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            dir: default_model_dir(),
            dimensions: default_dimensions(),
            auto_download: default_true(),
            allow_mock: default_true(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// A missing file yields the defaults (and a template is written for the
    /// default path); unparsable JSON also yields the defaults with a warning.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(self.max_top_k > 0, "max_top_k must be positive");
        anyhow::ensure!(
            (1..=self.max_top_k).contains(&self.search_top_k),
            "search_top_k must be between 1 and max_top_k ({})",
            self.max_top_k
        );
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(
            !self.image_store.trim().is_empty(),
            "image_store must not be empty"
        );
        for (label, collection) in [("text", &self.text), ("pmjay", &self.pmjay)] {
            anyhow::ensure!(
                !collection.sources.is_empty(),
                "{label}.sources must list at least one source"
            );
            anyhow::ensure!(
                !collection.db_path.trim().is_empty(),
                "{label}.db_path must not be empty"
            );
        }
        anyhow::ensure!(
            self.text.db_path != self.pmjay.db_path,
            "text and pmjay collections must use different db_path values"
        );
        Ok(())
    }

    /// Bound a requested result count to `[1, max_top_k]`.
    #[must_use]
    pub fn clamp_top_k(&self, k: usize) -> usize {
        k.clamp(1, self.max_top_k.max(1))
    }

    #[must_use]
    pub fn image_store_dir(&self) -> PathBuf {
        PathBuf::from(&self.image_store)
    }
}

impl CollectionConfig {
    /// Expand all source patterns into the sorted, de-duplicated list of
    /// supported document files.
    pub fn source_files(&self) -> Vec<PathBuf> {
        let mut files = BTreeSet::new();

        for pattern in &self.sources {
            match expand_pattern(pattern) {
                Ok(matches) => files.extend(matches),
                Err(e) => warn!("Failed to expand pattern {pattern}: {e}"),
            }
        }

        files.into_iter().collect()
    }
}

// ── Pattern helpers ──────────────────────────────────────────────────

/// Expand a single source entry: a file, a directory (walked recursively),
/// or a glob pattern.
fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    if !pattern.contains(['*', '?', '[']) {
        let path = Path::new(pattern);
        if path.is_file() {
            return Ok(if is_supported(path) {
                vec![path.to_path_buf()]
            } else {
                Vec::new()
            });
        }
        return Ok(walk_supported(path));
    }

    let matches = glob::glob(pattern).context("invalid glob pattern")?;
    Ok(matches
        .flatten()
        .filter(|entry| entry.is_file() && is_supported(entry))
        .collect())
}

/// Walk a directory (respecting `.gitignore`), collecting supported files.
fn walk_supported(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        warn!("Source directory not found: {}", dir.display());
        return Vec::new();
    }

    WalkBuilder::new(dir)
        .hidden(false)
        .build()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_supported(p))
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────
