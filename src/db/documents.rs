use super::{Db, models::Chunk, serialize_vector};
use chrono::{DateTime, Utc};
use rusqlite::{Result, params};
use std::collections::HashMap;

impl Db {
    /// Returns a map of filename -> modified_at for all indexed documents
    pub fn list_documents(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT filename, modified_at FROM documents")?;
        let rows = stmt.query_map([], |row| {
            let filename: String = row.get(0)?;
            let modified_at: DateTime<Utc> = row.get(1)?;
            Ok((filename, modified_at))
        })?;

        rows.collect()
    }

    /// Number of chunks currently stored.
    pub fn chunk_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Inserts or replaces a document with its chunks, metadata and embeddings
    pub fn insert_document(
        &mut self,
        filename: &str,
        modified_at: DateTime<Utc>,
        chunks: &[Chunk<'_>],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        assert_eq!(
            chunks.len(),
            embeddings.len(),
            "chunks and embeddings length mismatch"
        );

        let tx = self.conn.transaction()?;

        let doc_id: i64 = tx.query_row(
            r#"
            INSERT INTO documents (filename, modified_at, indexed_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(filename) DO UPDATE SET
                modified_at = excluded.modified_at,
                indexed_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
            params![filename, modified_at],
            |row| row.get(0),
        )?;

        tx.execute(
            "DELETE FROM vec_chunks WHERE rowid IN (SELECT id FROM chunks WHERE document_id = ?)",
            params![doc_id],
        )?;
        tx.execute("DELETE FROM chunks WHERE document_id = ?", params![doc_id])?;

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let metadata = serde_json::to_string(chunk.metadata)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            tx.execute(
                "INSERT INTO chunks (document_id, position, content, metadata) VALUES (?, ?, ?, ?)",
                params![doc_id, chunk.position as i64, chunk.content, metadata],
            )?;
            let chunk_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)",
                params![chunk_id, serialize_vector(embedding)],
            )?;
        }

        tx.commit()
    }
}
