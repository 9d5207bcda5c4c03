use super::{Db, models::SearchResult, serialize_vector};
use rusqlite::Result;
use rusqlite::types::Type;
use serde_json::{Map, Value};

fn map_search_row(row: &rusqlite::Row<'_>) -> Result<SearchResult> {
    let distance: f64 = row.get(4)?;
    let raw_metadata: String = row.get(5)?;
    let metadata: Map<String, Value> = serde_json::from_str(&raw_metadata)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(SearchResult {
        document_name: row.get(0)?,
        chunk_content: row.get(1)?,
        position: row.get::<_, i64>(2)? as usize,
        chunk_id: row.get(3)?,
        similarity: 1.0 - (distance / 2.0),
        metadata,
    })
}

impl Db {
    /// Return the `top_k` chunks nearest to `query_vector` by cosine distance,
    /// closest first.
    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                d.filename,
                c.content,
                c.position,
                c.id AS chunk_id,
                vec_distance_cosine(v.embedding, ?1) AS distance,
                c.metadata
            FROM vec_chunks v
            JOIN chunks c ON v.rowid = c.id
            JOIN documents d ON c.document_id = d.id
            ORDER BY distance ASC, c.id ASC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(
            rusqlite::params![serialize_vector(query_vector), top_k as i64],
            map_search_row,
        )?;

        rows.collect()
    }
}
