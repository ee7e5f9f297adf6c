//! Common test utilities for turn-level integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chartwise_agent::types::meta;
use chartwise_agent::{
    AgentError, AgentGraph, GraphConfig, RecordingStatusChannel, Tool, ToolContext, ToolRegistry, ToolResult,
};
use chartwise_index::{
    IndexError, IndexRecord, InMemoryVectorIndex, MetadataFilter, ScoredRecord, SharedIndex,
    VectorIndex,
};
use chartwise_llm::{
    CompletionResponse, ContentBlock, Embedder, MockBackend, MockEmbedder, MockResponse,
    ModelHandle, ModelTier, ProviderRegistry, StopReason, Usage,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

/// A scripted text answer.
pub fn text(t: &str) -> MockResponse {
    MockResponse::Success(CompletionResponse::text_only("mock", t))
}

/// A scripted response asking for one tool call.
pub fn tool_call(id: &str, name: &str, input: Value) -> MockResponse {
    MockResponse::Success(CompletionResponse::new(
        "mock",
        "mock-model",
        vec![ContentBlock::tool_use(id, name, input)],
        StopReason::ToolUse,
        Usage::new(10, 20),
    ))
}

/// One indexed chunk fixture.
#[derive(Debug, Clone)]
pub struct ChunkFixture {
    pub id: String,
    pub patient_id: String,
    pub document_id: String,
    pub report_date: Option<String>,
    pub content: String,
}

impl ChunkFixture {
    pub fn new(id: impl Into<String>, patient_id: &str, document_id: &str, date: Option<&str>) -> Self {
        let id = id.into();
        Self {
            content: format!("Lipid panel excerpt {id}: LDL cholesterol measured"),
            id,
            patient_id: patient_id.to_string(),
            document_id: document_id.to_string(),
            report_date: date.map(str::to_string),
        }
    }
}

/// An index whose every call fails.
#[derive(Debug, Default)]
pub struct UnreachableIndex;

#[async_trait]
impl VectorIndex for UnreachableIndex {
    async fn upsert(&self, _record: IndexRecord) -> chartwise_index::Result<()> {
        Err(IndexError::Unavailable("connection refused".into()))
    }

    async fn query(
        &self,
        _embedding: &[f32],
        _filter: &MetadataFilter,
        _k: usize,
    ) -> chartwise_index::Result<Vec<ScoredRecord>> {
        Err(IndexError::Unavailable("connection refused".into()))
    }

    async fn delete_by_source(&self, _source: &str) -> chartwise_index::Result<usize> {
        Err(IndexError::Unavailable("connection refused".into()))
    }

    async fn count(&self) -> chartwise_index::Result<usize> {
        Err(IndexError::Unavailable("connection refused".into()))
    }
}

/// A tool that answers with fixed text (or fails) and records its calls.
#[derive(Debug)]
pub struct RecordingTool {
    name: &'static str,
    output: Option<&'static str>,
    calls: Mutex<Vec<(Value, ToolContext)>>,
}

impl RecordingTool {
    pub fn new(name: &'static str, output: &'static str) -> Self {
        Self {
            name,
            output: Some(output),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A tool whose every call fails.
    pub fn failing(name: &'static str) -> Self {
        Self {
            name,
            output: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Value, ToolContext)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Test tool"
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> chartwise_agent::Result<ToolResult> {
        self.calls.lock().push((params, ctx.clone()));
        match self.output {
            Some(output) => Ok(ToolResult::text(output)),
            None => Err(AgentError::tool("upstream search timed out")),
        }
    }
}

/// Everything a turn test inspects after the fact.
pub struct TestHarness {
    pub fast: Arc<MockBackend>,
    pub advanced: Arc<MockBackend>,
    pub chunk_index: SharedIndex,
    pub memory_index: Arc<InMemoryVectorIndex>,
    pub status: Arc<RecordingStatusChannel>,
    pub graph: AgentGraph,
}

pub struct TestHarnessBuilder {
    fast: Vec<MockResponse>,
    advanced: Vec<MockResponse>,
    chunks: Vec<ChunkFixture>,
    chunk_index: Option<SharedIndex>,
    tools: ToolRegistry,
    config: GraphConfig,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder {
            fast: Vec::new(),
            advanced: Vec::new(),
            chunks: Vec::new(),
            chunk_index: None,
            tools: ToolRegistry::new(),
            config: GraphConfig::default(),
        }
    }
}

impl TestHarnessBuilder {
    /// Classifier, fact extraction and suggestions, in call order.
    pub fn fast(mut self, responses: Vec<MockResponse>) -> Self {
        self.fast = responses;
        self
    }

    /// Curation and dialogue, in call order.
    pub fn advanced(mut self, responses: Vec<MockResponse>) -> Self {
        self.advanced = responses;
        self
    }

    pub fn chunks(mut self, chunks: Vec<ChunkFixture>) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn chunk_index(mut self, index: SharedIndex) -> Self {
        self.chunk_index = Some(index);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn build(self) -> Result<TestHarness> {
        let embedder = Arc::new(MockEmbedder::default());

        let chunk_index: SharedIndex = match self.chunk_index {
            Some(index) => index,
            None => {
                let index = Arc::new(InMemoryVectorIndex::new());
                for chunk in &self.chunks {
                    let embedding = embedder.embed(&chunk.content).await?;
                    let mut record = IndexRecord::new(
                        &chunk.id,
                        &chunk.content,
                        embedding,
                        &chunk.document_id,
                    )
                    .with_metadata(meta::PATIENT_ID, chunk.patient_id.as_str())
                    .with_metadata(meta::DOCUMENT_ID, chunk.document_id.as_str())
                    .with_metadata(meta::FILENAME, format!("{}.pdf", chunk.document_id))
                    .with_metadata(meta::DOCUMENT_TYPE, "lab_report");
                    if let Some(date) = &chunk.report_date {
                        record = record
                            .with_metadata(meta::REPORT_DATE, date.as_str())
                            .with_metadata(meta::DATE_STATUS, "exact");
                    }
                    index.upsert(record).await?;
                }
                let shared: SharedIndex = index;
                shared
            }
        };

        let fast = Arc::new(MockBackend::with_results(self.fast));
        let advanced = Arc::new(MockBackend::with_results(self.advanced));
        let memory_index = Arc::new(InMemoryVectorIndex::new());
        let status = Arc::new(RecordingStatusChannel::new());

        let graph = AgentGraph::builder()
            .with_models(
                ProviderRegistry::new()
                    .with_tier(ModelTier::Fast, ModelHandle::new(fast.clone(), "fast-model"))
                    .with_tier(
                        ModelTier::Advanced,
                        ModelHandle::new(advanced.clone(), "advanced-model"),
                    ),
            )
            .with_embedder(embedder)
            .with_chunk_index(chunk_index.clone())
            .with_memory_index(memory_index.clone())
            .with_tools(self.tools)
            .with_status(status.clone())
            .with_config(self.config)
            .build()?;

        Ok(TestHarness {
            fast,
            advanced,
            chunk_index,
            memory_index,
            status,
            graph,
        })
    }
}
