use crate::db::Db;
use crate::db::models::Chunk;
use crate::embedder::Embedder;
use crate::indexer::chunker::split_text;
use crate::indexer::images::{extract_images, image_prefix};
use crate::indexer::loaders::{self, LoadError, PageText, SourceKind};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use std::path::Path;
use tracing::{debug, info, warn};

/// Summary of one indexing run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    pub failed: usize,
    pub empty: usize,
    pub chunks: usize,
    pub images: usize,
}

/// A chunk with its metadata, before embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChunk {
    pub content: String,
    pub metadata: Map<String, Value>,
}

/// Turns source files into embedded chunks in a [`Db`].
///
/// With an image store configured, JPEGs embedded in PDF pages are written
/// there and indexed as their own chunks carrying an `image_id`.
pub struct Indexer<'a, E: Embedder + ?Sized> {
    db: &'a mut Db,
    embedder: &'a E,
    chunk_size: usize,
    image_store: Option<&'a Path>,
}

impl<'a, E: Embedder + ?Sized> Indexer<'a, E> {
    pub fn new(db: &'a mut Db, embedder: &'a E, chunk_size: usize) -> Self {
        Self {
            db,
            embedder,
            chunk_size,
            image_store: None,
        }
    }

    #[must_use]
    pub fn with_image_store(mut self, image_store: Option<&'a Path>) -> Self {
        self.image_store = image_store;
        self
    }

    /// Index every file, replacing previous chunks of the same file.
    /// A file that fails to load or embed is logged and counted, not fatal.
    pub fn index_files<P: AsRef<Path>>(&mut self, files: &[P]) -> IndexReport {
        let mut report = IndexReport::default();

        for path in files {
            let path = path.as_ref();
            match self.index_file(path) {
                Ok((0, _)) => {
                    debug!("No text in {}", path.display());
                    report.empty += 1;
                }
                Ok((chunks, images)) => {
                    report.indexed += 1;
                    report.chunks += chunks;
                    report.images += images;
                }
                Err(e) => {
                    warn!("Failed to index {}: {e:#}", path.display());
                    report.failed += 1;
                }
            }
        }

        info!(
            "Indexed {} files ({} chunks, {} images), {} empty, {} failed",
            report.indexed, report.chunks, report.images, report.empty, report.failed
        );
        report
    }

    /// Index one file; returns `(chunks, images)` written.
    fn index_file(&mut self, path: &Path) -> anyhow::Result<(usize, usize)> {
        let source = path.to_string_lossy().replace('\\', "/");
        let modified_at: DateTime<Utc> = std::fs::metadata(path)?.modified()?.into();

        let (pages, mut pending, images) = match (SourceKind::from_path(path), self.image_store) {
            (Some(SourceKind::Pdf), Some(store)) => {
                let doc = lopdf::Document::load(path).map_err(|e| LoadError::Pdf {
                    path: path.into(),
                    source: e,
                })?;
                let pages = loaders::pdf_pages(&doc, path);
                let extracted = extract_images(&doc, &image_prefix(path), store)?;

                let mut image_chunks = Vec::with_capacity(extracted.len());
                for image in &extracted {
                    let page_text = pages
                        .iter()
                        .find(|p| p.page == image.page)
                        .map_or("", |p| p.text.as_str());
                    image_chunks.push(image_chunk(
                        &source,
                        image.page,
                        &image.image_id,
                        page_text,
                        self.chunk_size,
                    ));
                }
                (pages, image_chunks, extracted.len())
            }
            _ => (loaders::load_pages(path)?, Vec::new(), 0),
        };

        let mut all = text_chunks(&source, &pages, self.chunk_size);
        all.append(&mut pending);
        if all.is_empty() {
            return Ok((0, images));
        }

        let texts: Vec<&str> = all.iter().map(|c| c.content.as_str()).collect();
        let vectors = self.embedder.embed_passages(&texts)?;

        let db_chunks: Vec<Chunk<'_>> = all
            .iter()
            .enumerate()
            .map(|(position, c)| Chunk {
                position,
                content: &c.content,
                metadata: &c.metadata,
            })
            .collect();

        self.db
            .insert_document(&source, modified_at, &db_chunks, &vectors)?;

        Ok((all.len(), images))
    }
}

/// Chunk every page, tagging each chunk with its page and position.
pub fn text_chunks(source: &str, pages: &[PageText], chunk_size: usize) -> Vec<PendingChunk> {
    let mut chunks = Vec::new();
    for page in pages {
        for content in split_text(&page.text, chunk_size) {
            let mut metadata = Map::new();
            metadata.insert("source".into(), json!(source));
            metadata.insert("page".into(), json!(page.page));
            metadata.insert("chunk".into(), json!(chunks.len()));
            metadata.insert("kind".into(), json!("text"));
            chunks.push(PendingChunk { content, metadata });
        }
    }
    chunks
}

/// A searchable stand-in for an extracted image: a caption naming the file
/// and page, followed by the leading text of that page.
pub fn image_chunk(
    source: &str,
    page: u32,
    image_id: &str,
    page_text: &str,
    chunk_size: usize,
) -> PendingChunk {
    let file_name = Path::new(source)
        .file_name()
        .map_or_else(|| source.to_string(), |n| n.to_string_lossy().to_string());

    let mut content = format!("Image from {file_name} page {page}");
    let context: String = page_text.chars().take(chunk_size).collect();
    let context = context.trim();
    if !context.is_empty() {
        content.push_str("\n\n");
        content.push_str(context);
    }

    let mut metadata = Map::new();
    metadata.insert("source".into(), json!(source));
    metadata.insert("page".into(), json!(page));
    metadata.insert("image_id".into(), json!(image_id));
    metadata.insert("kind".into(), json!("image"));

    PendingChunk { content, metadata }
}
