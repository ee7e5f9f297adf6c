//! Vector index boundary for chartwise.
//!
//! Two indexes sit behind the same [`VectorIndex`] trait: the chunk index
//! (read-mostly, filled by ingestion) and the memory index (append-only,
//! filled at the end of each successful turn). Every query carries a
//! [`MetadataFilter`]; callers use it to scope results to one patient.
//!
//! Backends:
//! - [`SqliteVectorIndex`]: records table plus a sqlite-vec `vec0` table
//! - [`InMemoryVectorIndex`]: brute-force cosine search, for tests and
//!   throwaway runs

pub mod error;
pub mod filter;
pub mod memory;
pub mod sqlite;
pub mod vector;

use async_trait::async_trait;
use std::sync::Arc;

pub use error::{IndexError, Result};
pub use filter::{IndexRecord, MetadataFilter, ScoredRecord};
pub use memory::InMemoryVectorIndex;
pub use sqlite::SqliteVectorIndex;

/// Nearest-neighbour store with metadata filtering.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert a record, replacing any record with the same id.
    async fn upsert(&self, record: IndexRecord) -> Result<()>;

    /// Return up to `k` records matching `filter`, most similar first.
    async fn query(
        &self,
        embedding: &[f32],
        filter: &MetadataFilter,
        k: usize,
    ) -> Result<Vec<ScoredRecord>>;

    /// Remove every record whose source tag equals `source`.
    ///
    /// Returns the number of records removed.
    async fn delete_by_source(&self, source: &str) -> Result<usize>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize>;
}

/// An index that can be shared across threads.
pub type SharedIndex = Arc<dyn VectorIndex>;
