//! Clinical question-answering core for chartwise.
//!
//! This crate turns a question about one patient's longitudinal record into
//! a grounded, cited answer delivered over a status channel.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  TurnRunner: acknowledge, spawn, report failures           │
//! └────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │  AgentGraph                                                │
//! │  IntentClassifier -> HybridRetriever -> rerank             │
//! │    -> FactExtractor -> ContextCurator                      │
//! │  callModel <-> tools -> prettify -> saveContext            │
//! └────────────────────────────────────────────────────────────┘
//!              │               │               │
//!              ▼               ▼               ▼
//!       ┌──────────┐    ┌────────────┐   ┌──────────────┐
//!       │ Provider │    │ ToolReg    │   │ MemoryStore  │
//!       │ Registry │    │            │   │ StatusChannel│
//!       └──────────┘    └────────────┘   └──────────────┘
//! ```
//!
//! # Core Components
//!
//! - [`RetrievalPlan`]: candidate pool, evidence budget and per-document cap
//! - [`Chunk`]: a retrieved excerpt with its citation label
//! - [`AgentGraph`]: the per-turn state machine
//! - [`TurnRunner`]: detached execution with generic failure reporting

pub mod curator;
pub mod error;
pub mod facts;
pub mod graph;
pub mod intent;
pub mod memory;
pub mod plan;
pub mod prettify;
pub mod rerank;
pub mod retrieval;
pub mod runner;
pub mod status;
pub mod summaries;
pub mod text;
pub mod tool;
pub mod tools;
pub mod types;

// Re-export core types
pub use error::{AgentError, Result};
pub use types::{Chunk, DateStatus, StructuredFact, TurnId, citation_label, parse_report_date};

// Re-export pipeline stages
pub use curator::{ContextCurator, CuratedContext, CurationInput};
pub use facts::{FactExtractor, QualityMode};
pub use intent::IntentClassifier;
pub use plan::{PlanId, RetrievalPlan};
pub use rerank::rerank;
pub use retrieval::HybridRetriever;

// Re-export graph and runner
pub use graph::{
    AgentGraph, AgentGraphBuilder, AgentState, GraphConfig, Node, TurnOutcome, TurnRequest,
};
pub use runner::{GENERIC_FAILURE_MESSAGE, TurnRunner, TurnTicket};

// Re-export memory, status and summaries
pub use memory::{MemoryHit, MemoryStore};
pub use status::{
    BroadcastStatusChannel, RecordingStatusChannel, SharedStatusChannel, StatusChannel,
    StatusEvent, StatusKind, StatusSubscription,
};
pub use summaries::{
    DirectorySummaryStore, DocumentSummary, SharedSummaryStore, StaticSummaryStore, SummaryStore,
};

// Re-export tool types
pub use tool::{
    ParamExt, ParamResult, ParameterValidationError, Tool, ToolContext, ToolRegistry, ToolResult,
};
