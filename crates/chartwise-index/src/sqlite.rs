//! SQLite-backed vector index.
//!
//! Record text, source tag and metadata live in a plain `records` table;
//! vectors live in a sqlite-vec `vec0` table keyed by record id. Unfiltered
//! queries use the vec0 KNN. Filtered queries join `records` to the vectors
//! and rank the matching rows with `vec_distance_l2`, so the filter never
//! turns into a bound id list.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

use crate::VectorIndex;
use crate::error::{IndexError, Result};
use crate::filter::{IndexRecord, MetadataFilter, SOURCE_FIELD, ScoredRecord};
use crate::vector::{
    EMBEDDINGS_TABLE, SimilarityResult, create_vector_table, delete_embedding, distance_to_score,
    init_vector_extension, search_similar, store_embedding,
};
use zerocopy::IntoBytes;

/// A vector index persisted in one SQLite file.
pub struct SqliteVectorIndex {
    conn: Mutex<Connection>,
    dimensions: usize,
}

impl std::fmt::Debug for SqliteVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteVectorIndex")
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl SqliteVectorIndex {
    /// Open or create an index at `path`.
    pub fn open(path: impl AsRef<Path>, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                IndexError::Unavailable(format!("Cannot create {}: {}", parent.display(), e))
            })?;
        }

        init_vector_extension();
        let conn = Connection::open(path)?;
        let index = Self::from_connection(conn, dimensions)?;
        info!(path = %path.display(), dimensions, "Opened vector index");
        Ok(index)
    }

    /// Create a throwaway index in memory.
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        init_vector_extension();
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, dimensions)
    }

    fn from_connection(conn: Connection, dimensions: usize) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_records_source ON records(source);
            "#,
        )?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'dimensions'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match stored.map(|s| s.parse::<usize>()) {
            Some(Ok(existing)) if existing != dimensions => {
                return Err(IndexError::Dimension {
                    expected: existing,
                    actual: dimensions,
                });
            }
            Some(Err(e)) => {
                return Err(IndexError::InvalidData(format!(
                    "Bad stored dimensions: {}",
                    e
                )));
            }
            Some(Ok(_)) => {}
            None => {
                conn.execute(
                    "INSERT INTO index_meta (key, value) VALUES ('dimensions', ?1)",
                    params![dimensions.to_string()],
                )?;
            }
        }

        create_vector_table(&conn, dimensions)?;

        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
        })
    }

    /// Vector length this index accepts.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn check_dims(&self, len: usize) -> Result<()> {
        if len != self.dimensions {
            return Err(IndexError::Dimension {
                expected: self.dimensions,
                actual: len,
            });
        }
        Ok(())
    }

    /// `WHERE` clause over `records r` for `filter`, with its bound values.
    fn filter_clause(filter: &MetadataFilter) -> (String, Vec<SqlValue>) {
        let mut clauses = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        for (field, expected) in filter.conditions() {
            if field == SOURCE_FIELD {
                clauses.push("r.source = ?".to_string());
                values.push(json_to_sql(expected));
            } else if expected.is_null() {
                clauses.push("json_extract(r.metadata, ?) IS NULL".to_string());
                values.push(SqlValue::Text(json_path(field)));
            } else {
                clauses.push("json_extract(r.metadata, ?) = ?".to_string());
                values.push(SqlValue::Text(json_path(field)));
                values.push(json_to_sql(expected));
            }
        }

        (clauses.join(" AND "), values)
    }

    /// Nearest records among those matching `filter`.
    ///
    /// Binds a fixed number of parameters however many rows match.
    fn search_filtered(
        conn: &Connection,
        embedding: &[f32],
        filter: &MetadataFilter,
        k: usize,
    ) -> Result<Vec<SimilarityResult>> {
        let (clause, filter_values) = Self::filter_clause(filter);

        let mut values = Vec::with_capacity(filter_values.len() + 2);
        values.push(SqlValue::Blob(embedding.as_bytes().to_vec()));
        values.extend(filter_values);
        values.push(SqlValue::Integer(k as i64));

        let sql = format!(
            r#"
            SELECT r.id, vec_distance_l2(e.embedding, ?) AS distance
            FROM records r
            JOIN {EMBEDDINGS_TABLE} e ON e.record_id = r.id
            WHERE {clause}
            ORDER BY distance, r.id
            LIMIT ?
            "#
        );
        let mut stmt = conn.prepare(&sql)?;
        let hits = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(SimilarityResult {
                    record_id: row.get(0)?,
                    distance: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(hits = hits.len(), k, "Filtered search complete");
        Ok(hits)
    }

    fn load_record(conn: &Connection, id: &str) -> Result<Option<(String, String, Map<String, Value>)>> {
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT content, source, metadata FROM records WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            Some((content, source, metadata)) => {
                let metadata: Map<String, Value> = serde_json::from_str(&metadata)?;
                Ok(Some((content, source, metadata)))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, record: IndexRecord) -> Result<()> {
        self.check_dims(record.embedding.len())?;
        let metadata = serde_json::to_string(&record.metadata)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO records (id, content, source, metadata) VALUES (?1, ?2, ?3, ?4)",
            params![record.id, record.content, record.source, metadata],
        )?;
        store_embedding(&tx, &record.id, &record.embedding)?;
        tx.commit()?;

        debug!(id = %record.id, source = %record.source, "Upserted record");
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        filter: &MetadataFilter,
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        self.check_dims(embedding.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let hits = if filter.is_empty() {
            search_similar(&conn, embedding, k)?
        } else {
            Self::search_filtered(&conn, embedding, filter, k)?
        };

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Some((content, source, metadata)) = Self::load_record(&conn, &hit.record_id)? {
                results.push(ScoredRecord {
                    id: hit.record_id,
                    content,
                    source,
                    metadata,
                    score: distance_to_score(hit.distance),
                });
            }
        }
        Ok(results)
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let ids: Vec<String> = {
            let mut stmt = tx.prepare("SELECT id FROM records WHERE source = ?1")?;
            stmt.query_map(params![source], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        for id in &ids {
            delete_embedding(&tx, id)?;
        }
        tx.execute("DELETE FROM records WHERE source = ?1", params![source])?;
        tx.commit()?;

        info!(%source, removed = ids.len(), "Deleted records by source");
        Ok(ids.len())
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}

/// Convert a JSON scalar into the value `json_extract` would return for it.
fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(id: &str, patient: &str, embedding: Vec<f32>) -> IndexRecord {
        IndexRecord::new(id, format!("text of {id}"), embedding, format!("doc-{patient}"))
            .with_metadata("patientId", patient)
            .with_metadata("filename", format!("{id}.pdf"))
    }

    #[tokio::test]
    async fn test_upsert_and_query() {
        let index = SqliteVectorIndex::open_in_memory(3).unwrap();
        index.upsert(chunk("a", "p1", vec![1.0, 0.0, 0.0])).await.unwrap();
        index.upsert(chunk("b", "p1", vec![0.0, 1.0, 0.0])).await.unwrap();

        let hits = index
            .query(&[1.0, 0.0, 0.0], &MetadataFilter::all(), 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].content, "text of a");
        assert_eq!(hits[0].meta_str("filename"), Some("a.pdf"));
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_patient_filter_never_leaks() {
        let index = SqliteVectorIndex::open_in_memory(3).unwrap();
        index.upsert(chunk("mine", "p1", vec![0.0, 0.0, 1.0])).await.unwrap();
        index.upsert(chunk("theirs", "p2", vec![1.0, 0.0, 0.0])).await.unwrap();

        let filter = MetadataFilter::all().eq("patientId", "p1");
        let hits = index.query(&[1.0, 0.0, 0.0], &filter, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "mine");

        let filter = MetadataFilter::all().eq("patientId", "nobody");
        assert!(index.query(&[1.0, 0.0, 0.0], &filter, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_source_filter_and_delete() {
        let index = SqliteVectorIndex::open_in_memory(2).unwrap();
        index
            .upsert(IndexRecord::new("m1", "Q/A one", vec![1.0, 0.0], "p1"))
            .await
            .unwrap();
        index
            .upsert(IndexRecord::new("m2", "Q/A two", vec![1.0, 0.0], "p2"))
            .await
            .unwrap();

        let hits = index
            .query(&[1.0, 0.0], &MetadataFilter::all().source("p2"), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m2");

        assert_eq!(index.delete_by_source("p1").await.unwrap(), 1);
        assert_eq!(index.count().await.unwrap(), 1);
        assert!(index
            .query(&[1.0, 0.0], &MetadataFilter::all().source("p1"), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing() {
        let index = SqliteVectorIndex::open_in_memory(2).unwrap();
        index
            .upsert(IndexRecord::new("r", "old", vec![1.0, 0.0], "s"))
            .await
            .unwrap();
        index
            .upsert(IndexRecord::new("r", "new", vec![0.0, 1.0], "s"))
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let hits = index.query(&[0.0, 1.0], &MetadataFilter::all(), 1).await.unwrap();
        assert_eq!(hits[0].content, "new");
    }

    #[tokio::test]
    async fn test_reopen_persists_and_checks_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("chunks.db");

        {
            let index = SqliteVectorIndex::open(&path, 2).unwrap();
            index
                .upsert(IndexRecord::new("r", "kept", vec![1.0, 0.0], "s"))
                .await
                .unwrap();
        }

        let index = SqliteVectorIndex::open(&path, 2).unwrap();
        assert_eq!(index.count().await.unwrap(), 1);

        let err = SqliteVectorIndex::open(&path, 8).unwrap_err();
        assert!(matches!(err, IndexError::Dimension { expected: 2, actual: 8 }));
    }

    /// Bulk-load rows in one transaction; `upsert` per row is too slow here.
    fn bulk_load(index: &SqliteVectorIndex, n: usize, patient: &str, source: &str) {
        let mut conn = index.conn.lock();
        let tx = conn.transaction().unwrap();
        for i in 0..n {
            let id = format!("{patient}-{i}");
            let metadata = serde_json::json!({ "patientId": patient }).to_string();
            tx.execute(
                "INSERT INTO records (id, content, source, metadata) VALUES (?1, ?2, ?3, ?4)",
                params![id, format!("chunk {i}"), source, metadata],
            )
            .unwrap();
            let x = i as f32 / n as f32;
            store_embedding(&tx, &id, &[x, 1.0 - x]).unwrap();
        }
        tx.commit().unwrap();
    }

    #[tokio::test]
    async fn test_filtered_query_over_large_patient() {
        let index = SqliteVectorIndex::open_in_memory(2).unwrap();
        bulk_load(&index, 33_000, "p1", "doc-p1");
        index
            .upsert(chunk("other", "p2", vec![0.0, 1.0]))
            .await
            .unwrap();

        let filter = MetadataFilter::all().eq("patientId", "p1");
        let hits = index.query(&[0.0, 1.0], &filter, 25).await.unwrap();
        assert_eq!(hits.len(), 25);
        assert_eq!(hits[0].id, "p1-0");
        assert!(hits.iter().all(|h| h.meta_str("patientId") == Some("p1")));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

        let by_source = MetadataFilter::all().source("doc-p1");
        let hits = index.query(&[1.0, 0.0], &by_source, 5).await.unwrap();
        assert_eq!(hits.len(), 5);
        assert!(hits.iter().all(|h| h.source == "doc-p1"));
    }

    #[tokio::test]
    async fn test_wrong_query_dimensions() {
        let index = SqliteVectorIndex::open_in_memory(3).unwrap();
        let err = index
            .query(&[1.0], &MetadataFilter::all(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Dimension { .. }));
    }
}
