//! Vector store handles for the two document collections.
//!
//! A [`VectorStore`] is a persisted SQLite index plus the embedder used to
//! query it. [`load_or_create_vectorstore`] and
//! [`load_or_create_pmjay_vectorstore`] reuse an existing index unless a
//! rebuild is forced or it was built by a different embedder;
//! [`search_documents`] runs a top-k query against one.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex as TokioMutex;
use tracing::{info, warn};

use crate::config::{CollectionConfig, Config};
use crate::db::Db;
use crate::db::models::{Chunk, SearchResult};
use crate::embedder::Embedder;
use crate::indexer::core::Indexer;

/// Which document collection a store indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// HTML/CSS text documents.
    #[default]
    Text,
    /// PM-JAY documents with extracted images.
    Pmjay,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Text, Collection::Pmjay];

    /// Label of the search-mode choice in the UI.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Text => "Text documents (HTML/CSS)",
            Self::Pmjay => "Multimodal PM-JAY",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Pmjay => "pmjay",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A retrieved passage and its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    pub metadata: Map<String, Value>,
}

impl Document {
    #[must_use]
    pub fn new(page_content: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }

    /// Source page number, if recorded.
    #[must_use]
    pub fn page(&self) -> Option<&Value> {
        self.metadata.get("page").filter(|v| !v.is_null())
    }

    /// File name of an extracted image, if this passage has one.
    #[must_use]
    pub fn image_id(&self) -> Option<&str> {
        self.metadata.get("image_id").and_then(Value::as_str)
    }

    fn from_result(result: SearchResult) -> Self {
        let mut metadata = result.metadata;
        metadata
            .entry("source")
            .or_insert_with(|| json!(result.document_name));
        metadata.insert("score".into(), json!(result.similarity));
        Self {
            page_content: result.chunk_content,
            metadata,
        }
    }
}

/// Handle to one collection's index.
pub struct VectorStore {
    collection: Collection,
    name: String,
    db: TokioMutex<Db>,
    embedder: Arc<dyn Embedder>,
}

impl VectorStore {
    #[must_use]
    pub fn new(collection: Collection, name: impl Into<String>, db: Db, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            collection,
            name: name.into(),
            db: TokioMutex::new(db),
            embedder,
        }
    }

    /// An empty, non-persisted store.
    pub fn in_memory(
        collection: Collection,
        name: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let db = Db::open_in_memory(embedder.dimensions())?;
        Ok(Self::new(collection, name, db, embedder))
    }

    #[must_use]
    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Display name of the collection, e.g. "HTML & CSS documents".
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn chunk_count(&self) -> Result<usize> {
        Ok(self.db.lock().await.chunk_count()?)
    }

    /// Number of indexed source files.
    pub async fn document_count(&self) -> Result<usize> {
        Ok(self.db.lock().await.list_documents()?.len())
    }

    /// Embed and store `docs` as the chunks of `source`, replacing any
    /// chunks previously stored for it.
    pub async fn add_documents(&self, source: &str, docs: &[Document]) -> Result<()> {
        let texts: Vec<&str> = docs.iter().map(|d| d.page_content.as_str()).collect();
        let vectors = self.embedder.embed_passages(&texts)?;
        let chunks: Vec<Chunk<'_>> = docs
            .iter()
            .enumerate()
            .map(|(position, d)| Chunk {
                position,
                content: &d.page_content,
                metadata: &d.metadata,
            })
            .collect();

        let mut db = self.db.lock().await;
        db.insert_document(source, Utc::now(), &chunks, &vectors)?;
        Ok(())
    }
}

/// Return up to `k` documents from `store` ranked by relevance to `query`,
/// most relevant first. Each carries its similarity as metadata `score`.
pub async fn search_documents(store: &VectorStore, query: &str, k: usize) -> Result<Vec<Document>> {
    let query = query.trim();
    if query.is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let query_vector = store
        .embedder
        .embed_query(query)
        .context("failed to embed query")?;

    let results = {
        let db = store.db.lock().await;
        db.search(&query_vector, k).context("vector search failed")?
    };

    Ok(results.into_iter().map(Document::from_result).collect())
}

/// Load the HTML/CSS text store, building it from its sources when no index
/// exists yet or when `force_rebuild` is set.
pub fn load_or_create_vectorstore(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    force_rebuild: bool,
) -> Result<VectorStore> {
    load_or_create(Collection::Text, &config.text, None, config, embedder, force_rebuild)
}

/// Same contract as [`load_or_create_vectorstore`] for the PM-JAY store; a
/// rebuild also refreshes the extracted images in the image store.
pub fn load_or_create_pmjay_vectorstore(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    force_rebuild: bool,
) -> Result<VectorStore> {
    let image_store = config.image_store_dir();
    load_or_create(
        Collection::Pmjay,
        &config.pmjay,
        Some(&image_store),
        config,
        embedder,
        force_rebuild,
    )
}

/// Meta key holding the [`Embedder::signature`] an index was built with.
const EMBEDDER_META_KEY: &str = "embedder";

fn load_or_create(
    collection: Collection,
    settings: &CollectionConfig,
    image_store: Option<&Path>,
    config: &Config,
    embedder: Arc<dyn Embedder>,
    force_rebuild: bool,
) -> Result<VectorStore> {
    let db_path = PathBuf::from(&settings.db_path);

    if force_rebuild {
        info!("Rebuilding {collection} vector store from sources");
        discard_index(&db_path)?;
        if let Some(dir) = image_store {
            clear_image_store(dir)?;
        }
    }

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let signature = embedder.signature();
    let mut db = open_db(&db_path, embedder.as_ref())?;
    if let Some(stored) = stale_signature(&db, &signature)? {
        warn!("{collection} vector store was built with {stored}, not {signature}; rebuilding");
        drop(db);
        discard_index(&db_path)?;
        if let Some(dir) = image_store {
            clear_image_store(dir)?;
        }
        db = open_db(&db_path, embedder.as_ref())?;
    }

    let cached = db.chunk_count()?;
    if cached > 0 {
        info!("Loaded cached {collection} vector store ({cached} chunks)");
    } else {
        let files = settings.source_files();
        if files.is_empty() {
            warn!("No source documents found for {collection} collection: {:?}", settings.sources);
        }
        if let Some(dir) = image_store {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create image store {}", dir.display()))?;
        }

        db.set_meta(EMBEDDER_META_KEY, &signature)?;
        Indexer::new(&mut db, embedder.as_ref(), config.chunk_size)
            .with_image_store(image_store)
            .index_files(&files);
    }

    Ok(VectorStore::new(collection, settings.name.clone(), db, embedder))
}

fn open_db(db_path: &Path, embedder: &dyn Embedder) -> Result<Db> {
    Db::open(db_path, embedder.dimensions())
        .with_context(|| format!("failed to open vector store {}", db_path.display()))
}

/// The signature a non-empty index was built with, when it is not
/// `signature`. Indexes without a recorded signature count as stale.
fn stale_signature(db: &Db, signature: &str) -> Result<Option<String>> {
    let stale = match db.get_meta(EMBEDDER_META_KEY)? {
        Some(stored) if stored != signature => Some(stored),
        Some(_) => None,
        None if db.chunk_count()? > 0 => Some("an unknown embedder".to_string()),
        None => None,
    };
    Ok(stale)
}

fn discard_index(db_path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm", "-journal"] {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        let path = PathBuf::from(name);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
    }
    Ok(())
}

fn clear_image_store(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .with_context(|| format!("failed to clear image store {}", dir.display()))?;
    }
    Ok(())
}

/// Source of store handles; the seam between the UI state and the disk.
pub trait StoreLoader: Send + Sync {
    fn load_text(&self, force_rebuild: bool) -> Result<VectorStore>;
    fn load_pmjay(&self, force_rebuild: bool) -> Result<VectorStore>;

    fn load(&self, collection: Collection, force_rebuild: bool) -> Result<VectorStore> {
        match collection {
            Collection::Text => self.load_text(force_rebuild),
            Collection::Pmjay => self.load_pmjay(force_rebuild),
        }
    }
}

/// Loads stores from the paths in [`Config`].
pub struct DiskLoader {
    config: Arc<Config>,
    embedder: Arc<dyn Embedder>,
}

impl DiskLoader {
    #[must_use]
    pub fn new(config: Arc<Config>, embedder: Arc<dyn Embedder>) -> Self {
        Self { config, embedder }
    }
}

impl StoreLoader for DiskLoader {
    fn load_text(&self, force_rebuild: bool) -> Result<VectorStore> {
        load_or_create_vectorstore(&self.config, self.embedder.clone(), force_rebuild)
    }

    fn load_pmjay(&self, force_rebuild: bool) -> Result<VectorStore> {
        load_or_create_pmjay_vectorstore(&self.config, self.embedder.clone(), force_rebuild)
    }
}
