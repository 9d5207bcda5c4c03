use serde_json::{Map, Value};

/// A chunk of a source document ready for insertion.
#[derive(Debug, Clone)]
pub struct Chunk<'a> {
    pub position: usize,
    pub content: &'a str,
    pub metadata: &'a Map<String, Value>,
}

/// A chunk returned from a nearest-neighbour query.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub document_name: String,
    pub chunk_content: String,
    /// `1 - cosine_distance / 2`, in `[0, 1]`.
    pub similarity: f64,
    pub position: usize,
    pub chunk_id: i64,
    pub metadata: Map<String, Value>,
}
