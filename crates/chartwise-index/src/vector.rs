//! sqlite-vec plumbing: extension registration and the `vec0` table.

use rusqlite::{Connection, params};
use std::sync::Once;
use tracing::{debug, info};
use zerocopy::IntoBytes;

use crate::error::Result;

/// Name of the `vec0` virtual table holding record embeddings.
pub const EMBEDDINGS_TABLE: &str = "record_embeddings";

static VEC_INIT: Once = Once::new();

/// Register sqlite-vec for every connection opened afterwards.
///
/// `sqlite3_auto_extension` is process-global, so this runs once.
pub fn init_vector_extension() {
    use rusqlite::ffi::sqlite3_auto_extension;
    use sqlite_vec::sqlite3_vec_init;

    VEC_INIT.call_once(|| unsafe {
        #[allow(clippy::missing_transmute_annotations)]
        sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
    });
}

/// Version string reported by the loaded extension.
pub fn check_vector_extension(conn: &Connection) -> Result<String> {
    let version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
    Ok(version)
}

/// Create the embeddings table if it does not exist.
pub fn create_vector_table(conn: &Connection, dims: usize) -> Result<()> {
    let sql = format!(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS {EMBEDDINGS_TABLE} USING vec0(
            record_id TEXT PRIMARY KEY,
            embedding float[{dims}]
        )
        "#
    );
    conn.execute_batch(&sql)?;

    info!(dims, "Embeddings table ready");
    Ok(())
}

/// Store the embedding for a record, replacing any existing one.
pub fn store_embedding(conn: &Connection, record_id: &str, embedding: &[f32]) -> Result<()> {
    // vec0 doesn't support INSERT OR REPLACE
    delete_embedding(conn, record_id)?;
    conn.execute(
        &format!("INSERT INTO {EMBEDDINGS_TABLE} (record_id, embedding) VALUES (?1, ?2)"),
        params![record_id, embedding.as_bytes()],
    )?;
    Ok(())
}

/// Delete the embedding for a record.
pub fn delete_embedding(conn: &Connection, record_id: &str) -> Result<bool> {
    let rows = conn.execute(
        &format!("DELETE FROM {EMBEDDINGS_TABLE} WHERE record_id = ?1"),
        params![record_id],
    )?;
    Ok(rows > 0)
}

/// One KNN hit.
#[derive(Debug, Clone)]
pub struct SimilarityResult {
    pub record_id: String,
    /// L2 distance from the query vector (lower = more similar).
    pub distance: f32,
}

/// Unfiltered KNN search over every stored embedding.
pub fn search_similar(
    conn: &Connection,
    query_embedding: &[f32],
    limit: usize,
) -> Result<Vec<SimilarityResult>> {
    let sql = format!(
        r#"
        SELECT record_id, distance
        FROM {EMBEDDINGS_TABLE}
        WHERE embedding MATCH ?1
          AND k = ?2
        ORDER BY distance
        "#
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![query_embedding.as_bytes(), limit as i64])?;

    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        results.push(SimilarityResult {
            record_id: row.get(0)?,
            distance: row.get(1)?,
        });
    }

    debug!(hits = results.len(), limit, "KNN search complete");
    Ok(results)
}

/// Map an L2 distance onto a (0, 1] similarity.
pub fn distance_to_score(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}
