//! Typed provider registry.
//!
//! Model clients are built once at process start and looked up by
//! [`ModelTier`]. Each [`ModelHandle`] bundles a backend with the model name,
//! token limit and per-call timeout ceiling for its tier.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::backend::SharedBackend;
use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse, Message};

// ─────────────────────────────────────────────────────────────────────────────
// Model Tier
// ─────────────────────────────────────────────────────────────────────────────

/// Capability/cost tier of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTier {
    /// Cheap and quick: classification, suggestions, fast fact extraction.
    Fast,
    /// Strong: curation, dialogue, advanced fact extraction.
    Advanced,
}

impl ModelTier {
    /// Get the string name for this tier.
    pub fn name(&self) -> &'static str {
        match self {
            ModelTier::Fast => "fast",
            ModelTier::Advanced => "advanced",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Model Handle
// ─────────────────────────────────────────────────────────────────────────────

/// A configured model for one tier.
#[derive(Clone)]
pub struct ModelHandle {
    backend: SharedBackend,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ModelHandle {
    /// Create a handle with default token limit (1024) and timeout (60s).
    pub fn new(backend: SharedBackend, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }

    /// Set the max tokens per call.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the per-call timeout ceiling.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Model name used for requests.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Name of the underlying backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Start a request for this tier's model.
    pub fn request(&self, messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest::new(self.model.clone(), messages, self.max_tokens)
    }

    /// Run one completion under the timeout ceiling. Never retries.
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        match tokio::time::timeout(self.timeout, self.backend.complete(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    backend = self.backend.name(),
                    model = %self.model,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Model call exceeded its timeout"
                );
                Err(LlmError::Timeout(self.timeout))
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Model handles keyed by tier.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    handles: HashMap<ModelTier, ModelHandle>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that serves the same handle for every tier.
    pub fn single(handle: ModelHandle) -> Self {
        Self::new()
            .with_tier(ModelTier::Fast, handle.clone())
            .with_tier(ModelTier::Advanced, handle)
    }

    /// Register a handle for a tier, replacing any previous one.
    pub fn with_tier(mut self, tier: ModelTier, handle: ModelHandle) -> Self {
        self.handles.insert(tier, handle);
        self
    }

    /// Look up the handle for a tier.
    pub fn get(&self, tier: ModelTier) -> Result<&ModelHandle> {
        self.handles
            .get(&tier)
            .ok_or_else(|| LlmError::Config(format!("No model configured for tier '{}'", tier)))
    }
}
