//! Document-level summaries for documents attached to a turn.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// A summary ready for curation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub text: String,
}

/// Lookup of plain-text summaries by document id.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn get(&self, document_id: &str) -> Result<String>;
}

pub type SharedSummaryStore = Arc<dyn SummaryStore>;

/// Reads `<dir>/<documentId>.md`, falling back to `<dir>/<documentId>.txt`.
#[derive(Debug, Clone)]
pub struct DirectorySummaryStore {
    dir: PathBuf,
}

impl DirectorySummaryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

fn check_document_id(document_id: &str) -> Result<()> {
    let valid = !document_id.is_empty()
        && document_id != "."
        && document_id != ".."
        && !document_id.contains(['/', '\\'])
        && !document_id.contains('\0');
    if valid {
        Ok(())
    } else {
        Err(AgentError::summary(format!("invalid document id '{}'", document_id)))
    }
}

#[async_trait]
impl SummaryStore for DirectorySummaryStore {
    async fn get(&self, document_id: &str) -> Result<String> {
        check_document_id(document_id)?;

        for ext in ["md", "txt"] {
            let path = self.dir.join(format!("{document_id}.{ext}"));
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => return Ok(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(AgentError::summary(format!(
                        "failed to read {}: {}",
                        path.display(),
                        e
                    )));
                }
            }
        }
        Err(AgentError::summary(format!(
            "no summary for document '{}'",
            document_id
        )))
    }
}

/// Summaries held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticSummaryStore {
    summaries: HashMap<String, String>,
}

impl StaticSummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summary(mut self, document_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.summaries.insert(document_id.into(), text.into());
        self
    }
}

#[async_trait]
impl SummaryStore for StaticSummaryStore {
    async fn get(&self, document_id: &str) -> Result<String> {
        self.summaries
            .get(document_id)
            .cloned()
            .ok_or_else(|| AgentError::summary(format!("no summary for document '{}'", document_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_directory_prefers_markdown() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("doc-1.md"), "# Discharge summary").unwrap();
        std::fs::write(dir.path().join("doc-1.txt"), "plain").unwrap();
        std::fs::write(dir.path().join("doc-2.txt"), "MRI, no acute findings").unwrap();

        let store = DirectorySummaryStore::new(dir.path());
        assert_eq!(store.get("doc-1").await.unwrap(), "# Discharge summary");
        assert_eq!(store.get("doc-2").await.unwrap(), "MRI, no acute findings");
    }

    #[tokio::test]
    async fn test_directory_missing_and_traversal() {
        let dir = TempDir::new().unwrap();
        let store = DirectorySummaryStore::new(dir.path());
        assert!(matches!(store.get("nope").await, Err(AgentError::Summary(_))));
        assert!(matches!(store.get("../etc/passwd").await, Err(AgentError::Summary(_))));
        assert!(matches!(store.get("..").await, Err(AgentError::Summary(_))));
    }

    #[tokio::test]
    async fn test_static_store() {
        let store = StaticSummaryStore::new().with_summary("doc-1", "Annual physical");
        assert_eq!(store.get("doc-1").await.unwrap(), "Annual physical");
        assert!(store.get("doc-2").await.is_err());
    }
}
