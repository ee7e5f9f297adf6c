//! Brute-force in-process index.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{IndexError, Result};
use crate::filter::{IndexRecord, MetadataFilter, ScoredRecord};
use crate::VectorIndex;

/// Exhaustive cosine-similarity index held in memory.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    records: RwLock<HashMap<String, IndexRecord>>,
    dimensions: Option<usize>,
}

impl InMemoryVectorIndex {
    /// An index that accepts vectors of any length.
    pub fn new() -> Self {
        Self::default()
    }

    /// An index that rejects vectors whose length is not `dimensions`.
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            dimensions: Some(dimensions),
        }
    }

    fn check_dims(&self, len: usize) -> Result<()> {
        match self.dimensions {
            Some(expected) if expected != len => Err(IndexError::Dimension {
                expected,
                actual: len,
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, record: IndexRecord) -> Result<()> {
        self.check_dims(record.embedding.len())?;
        self.records.write().insert(record.id.clone(), record);
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        filter: &MetadataFilter,
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        self.check_dims(embedding.len())?;

        let records = self.records.read();
        let mut hits: Vec<ScoredRecord> = records
            .values()
            .filter(|r| filter.matches(&r.source, &r.metadata))
            .map(|r| ScoredRecord {
                id: r.id.clone(),
                content: r.content.clone(),
                source: r.source.clone(),
                metadata: r.metadata.clone(),
                score: cosine(embedding, &r.embedding),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| r.source != source);
        Ok(before - records.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na > 0.0 && nb > 0.0 { dot / (na * nb) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, patient: &str, embedding: Vec<f32>) -> IndexRecord {
        IndexRecord::new(id, format!("content {id}"), embedding, patient)
            .with_metadata("patientId", patient)
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let index = InMemoryVectorIndex::new();
        index.upsert(record("a", "p1", vec![1.0, 0.0])).await.unwrap();
        index.upsert(record("b", "p1", vec![0.7, 0.7])).await.unwrap();
        index.upsert(record("c", "p1", vec![0.0, 1.0])).await.unwrap();

        let hits = index
            .query(&[1.0, 0.0], &MetadataFilter::all(), 10)
            .await
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_query_respects_filter_and_k() {
        let index = InMemoryVectorIndex::new();
        for i in 0..5 {
            index
                .upsert(record(&format!("p1-{i}"), "p1", vec![1.0, i as f32]))
                .await
                .unwrap();
        }
        index.upsert(record("p2-0", "p2", vec![1.0, 0.0])).await.unwrap();

        let filter = MetadataFilter::all().eq("patientId", "p1");
        let hits = index.query(&[1.0, 0.0], &filter, 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.meta_str("patientId") == Some("p1")));
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_delete_by_source() {
        let index = InMemoryVectorIndex::new();
        index.upsert(record("a", "p1", vec![1.0, 0.0])).await.unwrap();
        index.upsert(record("a", "p1", vec![0.0, 1.0])).await.unwrap();
        index.upsert(record("b", "p2", vec![0.0, 1.0])).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 2);

        assert_eq!(index.delete_by_source("p1").await.unwrap(), 1);
        assert_eq!(index.delete_by_source("p1").await.unwrap(), 0);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dimension_check() {
        let index = InMemoryVectorIndex::with_dimensions(3);
        let err = index.upsert(record("a", "p1", vec![1.0])).await.unwrap_err();
        assert!(matches!(err, IndexError::Dimension { expected: 3, actual: 1 }));
    }
}
