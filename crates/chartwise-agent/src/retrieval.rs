//! Patient-scoped vector retrieval over the chunk index.

use chartwise_index::{MetadataFilter, SharedIndex};
use chartwise_llm::SharedEmbedder;
use tracing::debug;

use crate::error::Result;
use crate::types::{Chunk, meta};

/// Embeds the question and pulls nearest chunks for one patient.
///
/// Errors from the embedder or the index propagate unchanged.
#[derive(Clone)]
pub struct HybridRetriever {
    embedder: SharedEmbedder,
    index: SharedIndex,
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("embedder", &self.embedder.name())
            .finish()
    }
}

impl HybridRetriever {
    pub fn new(embedder: SharedEmbedder, index: SharedIndex) -> Self {
        Self { embedder, index }
    }

    /// The filter every chunk query carries.
    pub fn patient_filter(patient_id: &str) -> MetadataFilter {
        MetadataFilter::all().eq(meta::PATIENT_ID, patient_id)
    }

    /// Up to `k_candidates` chunks for `patient_id`, most similar first.
    pub async fn retrieve(
        &self,
        question: &str,
        patient_id: &str,
        k_candidates: usize,
    ) -> Result<Vec<Chunk>> {
        if k_candidates == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(question).await?;
        let hits = self
            .index
            .query(&embedding, &Self::patient_filter(patient_id), k_candidates)
            .await?;

        let chunks: Vec<Chunk> = hits.into_iter().map(Chunk::from_record).collect();
        debug!(patient_id, candidates = chunks.len(), k_candidates, "Chunks retrieved");
        Ok(chunks)
    }
}
