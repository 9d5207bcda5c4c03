//! # ragsearch: local retrieval-augmented document search
//!
//! Indexes two document collections into SQLite vector stores and serves a
//! small browser UI that runs natural-language queries against them:
//! a plain-text HTML/CSS collection and a multimodal PM-JAY collection whose
//! PDF pages may carry extracted images.
//!
//! ## Architecture
//!
//! - **[`config`]**: Configuration loading, validation, and source pattern expansion
//! - **[`db`]**: SQLite + sqlite-vec vector database (CRUD, k-NN search)
//! - **[`embedder`]**: Text embedding via ONNX Runtime (multilingual-e5-small)
//! - **[`indexer`]**: Document loaders (PDF/HTML/CSS/Markdown), chunking, PDF image extraction
//! - **[`store`]**: Vector store handles: load-or-create per collection and `search_documents`
//! - **[`web`]**: axum UI server: sidebar controls, query handling, result rendering

pub mod config;
pub mod db;
pub mod embedder;
pub mod indexer;
pub mod store;
pub mod web;
