//! Error types for the agent crate.

use thiserror::Error;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Error type for agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Model or embedding backend error.
    #[error("LLM error: {0}")]
    Llm(#[from] chartwise_llm::LlmError),

    /// Vector index error.
    #[error("Index error: {0}")]
    Index(#[from] chartwise_index::IndexError),

    /// Tool execution error.
    #[error("Tool error: {0}")]
    Tool(String),

    /// Tool not found in registry.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Context curation produced nothing usable.
    #[error("Curation error: {0}")]
    Curation(String),

    /// Status channel delivery error.
    #[error("Status channel error: {0}")]
    Status(String),

    /// Document summary lookup error.
    #[error("Summary error: {0}")]
    Summary(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The tools -> callModel cycle ran more times than allowed.
    #[error("Maximum tool passes exceeded: {0}")]
    MaxToolPasses(usize),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Create a tool error.
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }

    /// Create a summary error.
    pub fn summary(msg: impl Into<String>) -> Self {
        Self::Summary(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::tool("trial registry unreachable");
        assert!(err.to_string().contains("Tool error"));
        assert!(err.to_string().contains("trial registry unreachable"));
    }

    #[test]
    fn test_from_index_error() {
        let err: AgentError = chartwise_index::IndexError::Unavailable("down".into()).into();
        assert!(matches!(err, AgentError::Index(_)));
    }

    #[test]
    fn test_max_tool_passes() {
        let err = AgentError::MaxToolPasses(8);
        assert_eq!(err.to_string(), "Maximum tool passes exceeded: 8");
    }
}
