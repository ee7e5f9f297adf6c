//! Long-term memory of past question/answer exchanges.
//!
//! Each completed turn appends one record to the memory index, tagged with
//! the patient id as its source. Recall is always scoped to one patient.
//! Records are never updated; [`MemoryStore::forget_patient`] is the only
//! deletion path and the turn path never calls it.

use chartwise_index::{IndexRecord, MetadataFilter, SharedIndex};
use chartwise_llm::SharedEmbedder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::types::meta;

const MEMORY_KIND: &str = "qa";

/// A recalled exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub score: f32,
}

/// Format an exchange as one memory document.
pub fn format_exchange(question: &str, answer: &str) -> String {
    format!("Question: {}\nAnswer: {}", question.trim(), answer.trim())
}

/// Append-only, patient-scoped memory over a vector index.
#[derive(Clone)]
pub struct MemoryStore {
    embedder: SharedEmbedder,
    index: SharedIndex,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("embedder", &self.embedder.name())
            .finish()
    }
}

impl MemoryStore {
    pub fn new(embedder: SharedEmbedder, index: SharedIndex) -> Self {
        Self { embedder, index }
    }

    /// Up to `k` past exchanges for `patient_id` relevant to `query`.
    pub async fn recall(&self, patient_id: &str, query: &str, k: usize) -> Result<Vec<MemoryHit>> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await?;
        let hits = self
            .index
            .query(&embedding, &MetadataFilter::all().source(patient_id), k)
            .await?;

        let memories: Vec<MemoryHit> = hits
            .into_iter()
            .map(|hit| MemoryHit {
                created_at: hit
                    .meta_str(meta::CREATED_AT)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
                id: hit.id,
                text: hit.content,
                score: hit.score,
            })
            .collect();

        debug!(patient_id, memories = memories.len(), k, "Memories recalled");
        Ok(memories)
    }

    /// Persist one exchange. Returns the new record id.
    pub async fn remember(&self, patient_id: &str, question: &str, answer: &str) -> Result<String> {
        let text = format_exchange(question, answer);
        let embedding = self.embedder.embed(&text).await?;
        let id = Uuid::new_v4().to_string();

        let record = IndexRecord::new(&id, text, embedding, patient_id)
            .with_metadata(meta::PATIENT_ID, patient_id)
            .with_metadata(meta::CREATED_AT, Utc::now().to_rfc3339())
            .with_metadata(meta::KIND, MEMORY_KIND);
        self.index.upsert(record).await?;

        debug!(patient_id, memory_id = %id, "Exchange remembered");
        Ok(id)
    }

    /// Delete every memory for `patient_id`. Returns how many were removed.
    pub async fn forget_patient(&self, patient_id: &str) -> Result<usize> {
        let removed = self.index.delete_by_source(patient_id).await?;
        info!(patient_id, removed, "Patient memories deleted");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartwise_index::{InMemoryVectorIndex, VectorIndex};
    use chartwise_llm::MockEmbedder;
    use std::sync::Arc;

    fn store() -> (MemoryStore, Arc<InMemoryVectorIndex>) {
        let index = Arc::new(InMemoryVectorIndex::new());
        (
            MemoryStore::new(Arc::new(MockEmbedder::default()), index.clone()),
            index,
        )
    }

    #[test]
    fn test_format_exchange() {
        assert_eq!(
            format_exchange(" What is my A1c? ", "6.1% [labs.pdf, 2024-01-02]\n"),
            "Question: What is my A1c?\nAnswer: 6.1% [labs.pdf, 2024-01-02]"
        );
    }

    #[tokio::test]
    async fn test_remember_and_recall_scoped() {
        let (store, index) = store();
        store.remember("p1", "What is my A1c?", "6.1%").await.unwrap();
        store.remember("p2", "What is my A1c?", "8.4%").await.unwrap();
        assert_eq!(index.count().await.unwrap(), 2);

        let hits = store.recall("p1", "A1c", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("6.1%"));
        assert!(hits[0].created_at.is_some());
    }

    #[tokio::test]
    async fn test_recall_zero_k() {
        let (store, _) = store();
        store.remember("p1", "q", "a").await.unwrap();
        assert!(store.recall("p1", "q", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forget_patient() {
        let (store, index) = store();
        store.remember("p1", "q1", "a1").await.unwrap();
        store.remember("p1", "q2", "a2").await.unwrap();
        store.remember("p2", "q3", "a3").await.unwrap();

        assert_eq!(store.forget_patient("p1").await.unwrap(), 2);
        assert_eq!(index.count().await.unwrap(), 1);
        assert!(store.recall("p1", "q1", 5).await.unwrap().is_empty());
    }
}
