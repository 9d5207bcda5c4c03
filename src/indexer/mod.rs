//! Document ingestion: format loaders, chunking, PDF image extraction and
//! the [`core::Indexer`] that embeds and stores the result.

pub mod chunker;
pub mod core;
pub mod images;
pub mod loaders;
