//! Tool framework for agent capabilities.
//!
//! A [`Tool`] is a named capability with a JSON Schema for its arguments.
//! Tools are collected once at startup into a [`ToolRegistry`] and bound to
//! every dialogue model call. Execution errors propagate: a failing tool
//! aborts the turn.
//!
//! # Example
//!
//! ```rust,ignore
//! use chartwise_agent::{Tool, ToolContext, ToolResult, ToolRegistry};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Tool for Echo {
//!     fn name(&self) -> &str { "echo" }
//!     fn description(&self) -> &str { "Repeats its input" }
//!     fn parameters(&self) -> Value { json!({"type": "object"}) }
//!
//!     async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
//!         Ok(ToolResult::text(params.to_string()))
//!     }
//! }
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(Echo);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::types::TurnId;

// ─────────────────────────────────────────────────────────────────────────────
// Parameter Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for tool parameter validation failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParameterValidationError {
    /// A required parameter is missing.
    #[error("missing required parameter '{name}': {hint}")]
    MissingRequired {
        name: &'static str,
        hint: &'static str,
    },

    /// A parameter value is out of range.
    #[error("'{name}' value {value} is out of range: {constraint}")]
    OutOfRange {
        name: &'static str,
        value: String,
        constraint: String,
    },

    /// A parameter value doesn't match the expected enum.
    #[error("'{name}' has invalid value '{value}': {message}")]
    InvalidValue {
        name: &'static str,
        value: String,
        message: String,
    },
}

impl ParameterValidationError {
    pub fn missing(name: &'static str, hint: &'static str) -> Self {
        Self::MissingRequired { name, hint }
    }

    pub fn out_of_range(
        name: &'static str,
        value: impl ToString,
        constraint: impl Into<String>,
    ) -> Self {
        Self::OutOfRange {
            name,
            value: value.to_string(),
            constraint: constraint.into(),
        }
    }

    pub fn invalid_value(
        name: &'static str,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            name,
            value: value.into(),
            message: message.into(),
        }
    }
}

impl From<ParameterValidationError> for AgentError {
    fn from(err: ParameterValidationError) -> Self {
        AgentError::Tool(err.to_string())
    }
}

/// Result type for parameter validation.
pub type ParamResult<T> = std::result::Result<T, ParameterValidationError>;

/// Helper trait for extracting parameters from JSON arguments.
pub trait ParamExt {
    /// A required, non-blank string parameter.
    fn required_str(&self, name: &'static str, hint: &'static str) -> ParamResult<&str>;

    /// An optional string parameter. Blank strings count as absent.
    fn optional_str(&self, name: &str) -> Option<&str>;

    /// An optional u64 parameter with default.
    fn optional_u64(&self, name: &str, default: u64) -> u64;
}

impl ParamExt for serde_json::Value {
    fn required_str(&self, name: &'static str, hint: &'static str) -> ParamResult<&str> {
        self.optional_str(name)
            .ok_or_else(|| ParameterValidationError::missing(name, hint))
    }

    fn optional_str(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn optional_u64(&self, name: &str, default: u64) -> u64 {
        self.get(name).and_then(|v| v.as_u64()).unwrap_or(default)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for agent tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model calls the tool by.
    fn name(&self) -> &str;

    /// What the tool does, for the model.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments.
    fn parameters(&self) -> serde_json::Value;

    /// Run the tool. Validation failures and upstream errors are `Err`.
    async fn execute(&self, params: serde_json::Value, ctx: &ToolContext) -> Result<ToolResult>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Context
// ─────────────────────────────────────────────────────────────────────────────

/// Ambient turn configuration handed to every tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolContext {
    pub turn_id: TurnId,
    pub patient_id: String,
    /// Preferred answer language (BCP 47 tag such as `en` or `es`).
    pub language: String,
    /// Storage container the patient's documents live in.
    pub container: String,
}

impl ToolContext {
    pub fn new(turn_id: TurnId, patient_id: impl Into<String>) -> Self {
        Self {
            turn_id,
            patient_id: patient_id.into(),
            language: "en".to_string(),
            container: String::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Result
// ─────────────────────────────────────────────────────────────────────────────

/// Successful output of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResult {
    Text { content: String },
    Json { content: serde_json::Value },
}

impl ToolResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn json(content: serde_json::Value) -> Self {
        Self::Json { content }
    }

    /// The content as handed back to the model.
    pub fn to_llm_content(&self) -> String {
        match self {
            Self::Text { content } => content.clone(),
            Self::Json { content } => {
                serde_json::to_string_pretty(content).unwrap_or_else(|_| content.to_string())
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Name-keyed set of tools, resolved once at startup.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions to bind to a model request, sorted by name.
    pub fn to_llm_definitions(&self) -> Vec<chartwise_llm::ToolDefinition> {
        self.names()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                chartwise_llm::ToolDefinition::new(tool.name(), tool.description(), tool.parameters())
            })
            .collect()
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        tool.execute(params, ctx).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Tool (for testing)
// ─────────────────────────────────────────────────────────────────────────────

/// A mock tool that records its calls.
#[cfg(test)]
#[derive(Debug)]
pub struct MockTool {
    name: String,
    response: Option<String>,
    calls: parking_lot::Mutex<Vec<(serde_json::Value, ToolContext)>>,
}

#[cfg(test)]
impl MockTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: Some("mock response".to_string()),
            calls: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// A tool whose every call fails.
    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            response: None,
            ..Self::new(name)
        }
    }

    pub fn calls(&self) -> Vec<(serde_json::Value, ToolContext)> {
        self.calls.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "A mock tool for testing"
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, params: serde_json::Value, ctx: &ToolContext) -> Result<ToolResult> {
        self.calls.lock().push((params, ctx.clone()));
        match &self.response {
            Some(text) => Ok(ToolResult::text(text.clone())),
            None => Err(AgentError::tool("mock failure")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_result_content() {
        assert_eq!(ToolResult::text("hello").to_llm_content(), "hello");
        let json = ToolResult::json(json!({"a": 1})).to_llm_content();
        assert!(json.contains("\"a\": 1"));
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register(MockTool::new("web_search"));
        registry.register(MockTool::new("clinical_trials"));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("web_search"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["clinical_trials", "web_search"]);
    }

    #[test]
    fn test_registry_definitions_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool::new("zeta"));
        registry.register(MockTool::new("alpha"));
        let defs = registry.to_llm_definitions();
        assert_eq!(defs[0].name, "alpha");
        assert_eq!(defs[1].name, "zeta");
        assert_eq!(defs[0].input_schema["type"], "object");
    }

    #[tokio::test]
    async fn test_registry_execute_passes_context() {
        let tool = Arc::new(MockTool::new("echo"));
        let mut registry = ToolRegistry::new();
        registry.register_arc(tool.clone());

        let ctx = ToolContext::new(TurnId::new(), "p1")
            .with_language("es")
            .with_container("patients/p1");
        let result = registry.execute("echo", json!({"q": 1}), &ctx).await.unwrap();
        assert_eq!(result.to_llm_content(), "mock response");

        let calls = tool.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, json!({"q": 1}));
        assert_eq!(calls[0].1.language, "es");
        assert_eq!(calls[0].1.container, "patients/p1");
    }

    #[tokio::test]
    async fn test_registry_execute_errors() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool::failing("broken"));
        let ctx = ToolContext::new(TurnId::new(), "p1");

        let err = registry.execute("missing", json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolNotFound(_)));

        let err = registry.execute("broken", json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::Tool(_)));
    }

    #[test]
    fn test_param_ext() {
        let params = json!({"query": "  statins ", "blank": "   ", "max": 3});
        assert_eq!(params.required_str("query", "search text").unwrap(), "statins");
        assert!(params.required_str("blank", "x").is_err());
        assert_eq!(params.optional_str("missing"), None);
        assert_eq!(params.optional_u64("max", 5), 3);
        assert_eq!(params.optional_u64("other", 5), 5);
    }

    #[test]
    fn test_validation_error_into_agent_error() {
        let err: AgentError = ParameterValidationError::invalid_value("status", "SOON", "unknown").into();
        assert!(err.to_string().contains("'status' has invalid value 'SOON'"));
    }
}
