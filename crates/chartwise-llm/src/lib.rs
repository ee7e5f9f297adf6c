//! Language-model boundary for chartwise.
//!
//! Everything the clinical agent needs from a model provider goes through
//! this crate: a provider-agnostic message format, the [`LlmBackend`] trait,
//! an OpenAI-compatible HTTP backend, text embedders, and a typed
//! [`ProviderRegistry`] that hands out per-tier [`ModelHandle`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  ProviderRegistry (ModelTier -> ModelHandle) │
//! │  - model name, max tokens, timeout ceiling   │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │  LlmBackend trait                            │
//! │  - complete() -> CompletionResponse          │
//! └──────────────────────────────────────────────┘
//!            │                     │
//!            ▼                     ▼
//!     ┌─────────────┐       ┌─────────────┐
//!     │ OpenAI-compat│       │ MockBackend │
//!     └─────────────┘       └─────────────┘
//! ```
//!
//! Calls are never retried here. A failed or timed-out call surfaces to the
//! caller, which decides whether the failure is fatal.

pub mod backend;
pub mod embeddings;
pub mod error;
pub mod openai;
pub mod registry;
pub mod types;

pub use backend::{LlmBackend, MockBackend, MockResponse, SharedBackend};
pub use error::{LlmError, Result};
pub use types::{
    CompletionRequest, CompletionResponse, Content, ContentBlock, Message, Role, StopReason,
    ToolDefinition, ToolUseBlock, Usage,
};

pub use embeddings::{
    Embedder, MockEmbedder, OpenAiEmbedder, OpenAiEmbedderConfig, SharedEmbedder,
    cosine_similarity,
};

pub use openai::{OpenAiBackend, OpenAiConfig};

pub use registry::{ModelHandle, ModelTier, ProviderRegistry};
