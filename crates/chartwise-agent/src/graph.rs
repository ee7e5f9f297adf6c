//! The dialogue state machine for one turn.
//!
//! A turn first runs the retrieval pipeline (classify, retrieve, rerank,
//! extract facts, fetch attached summaries) and then drives an explicit
//! finite-state loop:
//!
//! ```text
//!            ┌──────────────┐   tool call    ┌───────┐
//!  entry ──▶ │  callModel   │ ─────────────▶ │ tools │
//!            └──────────────┘ ◀───────────── └───────┘
//!                   │ final text
//!                   ▼
//!            ┌──────────────┐     ┌─────────────┐
//!            │   prettify   │ ──▶ │ saveContext │ ──▶ end
//!            └──────────────┘     └─────────────┘
//! ```
//!
//! Each node takes the [`AgentState`] by value and returns the next state
//! with the tag of the node to run next. Errors in `callModel` and `tools`
//! abort the turn. `saveContext` never fails: it delivers the answer and
//! hands the memory write and suggestion generation to a detached task.

use std::fmt;
use std::sync::Arc;

use chartwise_index::SharedIndex;
use chartwise_llm::{
    Content, ContentBlock, Message, ModelTier, ProviderRegistry, Role, SharedEmbedder,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::curator::{ContextCurator, CuratedContext, CurationInput};
use crate::error::{AgentError, Result};
use crate::facts::{FactExtractor, QualityMode};
use crate::intent::IntentClassifier;
use crate::memory::MemoryStore;
use crate::plan::RetrievalPlan;
use crate::prettify::prettify;
use crate::rerank::rerank;
use crate::retrieval::HybridRetriever;
use crate::status::{SharedStatusChannel, StatusEvent, StatusKind};
use crate::summaries::{DocumentSummary, SharedSummaryStore};
use crate::text::json_array_slice;
use crate::tool::{ToolContext, ToolRegistry};
use crate::types::{Chunk, StructuredFact, TurnId};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime knobs for the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Memories recalled per model pass.
    pub memory_k: usize,
    /// Upper bound on follow-up suggestions.
    pub max_suggestions: usize,
    /// Upper bound on tools -> callModel cycles per turn.
    pub max_tool_passes: usize,
    pub default_language: String,
    pub default_container: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            memory_k: 5,
            max_suggestions: 3,
            max_tool_passes: 8,
            default_language: "en".to_string(),
            default_container: String::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Turn input / output
// ─────────────────────────────────────────────────────────────────────────────

/// One inbound question.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub turn_id: TurnId,
    /// Addressee of status events.
    pub user_id: String,
    pub patient_id: String,
    pub question: String,
    /// Prior conversation, oldest first. The question is appended to it.
    pub history: Vec<Message>,
    pub language: Option<String>,
    /// Document ids whose summaries join the curated context.
    pub attachments: Vec<String>,
    pub container: Option<String>,
    pub quality: QualityMode,
}

impl TurnRequest {
    pub fn new(
        user_id: impl Into<String>,
        patient_id: impl Into<String>,
        question: impl Into<String>,
    ) -> Self {
        Self {
            turn_id: TurnId::new(),
            user_id: user_id.into(),
            patient_id: patient_id.into(),
            question: question.into(),
            history: Vec::new(),
            language: None,
            attachments: Vec::new(),
            container: None,
            quality: QualityMode::default(),
        }
    }

    pub fn with_turn_id(mut self, turn_id: TurnId) -> Self {
        self.turn_id = turn_id;
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_attachment(mut self, document_id: impl Into<String>) -> Self {
        self.attachments.push(document_id.into());
        self
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn with_quality(mut self, quality: QualityMode) -> Self {
        self.quality = quality;
        self
    }
}

/// Result of a completed turn.
#[derive(Debug)]
pub struct TurnOutcome {
    pub turn_id: TurnId,
    pub answer: String,
    pub plan: RetrievalPlan,
    pub evidence: Vec<Chunk>,
    /// Nodes in the order they ran, terminal tag included.
    pub visited: Vec<Node>,
    /// Detached memory write and suggestion generation. Awaiting it is
    /// optional; the turn is already complete.
    pub trailing: Option<JoinHandle<()>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// State machine
// ─────────────────────────────────────────────────────────────────────────────

/// Node tags of the dialogue graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    CallModel,
    Tools,
    Prettify,
    SaveContext,
    End,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::CallModel => "callModel",
            Node::Tools => "tools",
            Node::Prettify => "prettify",
            Node::SaveContext => "saveContext",
            Node::End => "end",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turn state threaded through the nodes.
#[derive(Debug)]
pub struct AgentState {
    pub messages: Vec<Message>,
    pub memory: MemoryStore,
    pub tool_passes: usize,
    pub answer: Option<String>,
    pub trailing: Option<JoinHandle<()>>,
}

impl AgentState {
    pub fn new(messages: Vec<Message>, memory: MemoryStore) -> Self {
        Self {
            messages,
            memory,
            tool_passes: 0,
            answer: None,
            trailing: None,
        }
    }

    /// Text of the most recent user message. Tool results are skipped.
    pub fn latest_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::User && !carries_tool_result(m))
            .map(Message::text)
            .find(|t| !t.trim().is_empty())
    }
}

fn carries_tool_result(message: &Message) -> bool {
    match &message.content {
        Content::Text(_) => false,
        Content::Blocks(blocks) => blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolResult { .. })),
    }
}

/// A node's result: the new state and where to go next.
#[derive(Debug)]
pub struct Transition {
    pub state: AgentState,
    pub next: Node,
}

impl Transition {
    fn to(state: AgentState, next: Node) -> Self {
        Self { state, next }
    }
}

/// Everything fixed for the duration of one turn.
struct TurnScope<'a> {
    request: &'a TurnRequest,
    language: &'a str,
    container: &'a str,
    evidence: &'a [Chunk],
    facts: &'a [StructuredFact],
    summaries: &'a [DocumentSummary],
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent graph
// ─────────────────────────────────────────────────────────────────────────────

/// Drives one question from retrieval to a delivered answer.
pub struct AgentGraph {
    models: Arc<ProviderRegistry>,
    classifier: IntentClassifier,
    retriever: HybridRetriever,
    facts: FactExtractor,
    curator: ContextCurator,
    memory: MemoryStore,
    tools: Arc<ToolRegistry>,
    status: SharedStatusChannel,
    summaries: Option<SharedSummaryStore>,
    config: GraphConfig,
}

impl fmt::Debug for AgentGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentGraph")
            .field("tools", &self.tools.names())
            .field("summaries", &self.summaries.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl AgentGraph {
    pub fn builder() -> AgentGraphBuilder {
        AgentGraphBuilder::new()
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Run one turn to completion.
    ///
    /// Retrieval, curation, dialogue and tool errors abort the turn before
    /// any answer is delivered and before any memory is written.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnOutcome> {
        let turn_id = request.turn_id;
        let patient_id = request.patient_id.as_str();
        info!(%turn_id, patient_id, "Turn started");

        let plan = self.classifier.classify(&request.question, patient_id).await;
        let candidates = self
            .retriever
            .retrieve(&request.question, patient_id, plan.k_candidates)
            .await?;
        let candidate_count = candidates.len();
        let evidence = rerank(candidates, &plan);
        let facts = self
            .facts
            .extract(&evidence, &request.question, patient_id, request.quality)
            .await;
        let summaries = self.fetch_summaries(&request).await;

        info!(
            %turn_id,
            patient_id,
            plan = %plan.id,
            candidates = candidate_count,
            selected = evidence.len(),
            facts = facts.len(),
            summaries = summaries.len(),
            "Retrieval complete"
        );

        let scope = TurnScope {
            request: &request,
            language: request
                .language
                .as_deref()
                .unwrap_or(&self.config.default_language),
            container: request
                .container
                .as_deref()
                .unwrap_or(&self.config.default_container),
            evidence: &evidence,
            facts: &facts,
            summaries: &summaries,
        };

        let mut messages = request.history.clone();
        messages.push(Message::user(&request.question));
        let mut state = AgentState::new(messages, self.memory.clone());
        let mut node = Node::CallModel;
        let mut visited = Vec::new();

        loop {
            visited.push(node);
            debug!(%turn_id, node = %node, "Entering node");
            let transition = match node {
                Node::CallModel => self.call_model(&scope, state).await?,
                Node::Tools => self.run_tool(&scope, state).await?,
                Node::Prettify => self.format_answer(state)?,
                Node::SaveContext => self.save_context(&scope, state).await,
                Node::End => break,
            };
            state = transition.state;
            node = transition.next;
        }

        let answer = state.answer.unwrap_or_default();
        info!(
            %turn_id,
            patient_id,
            tool_passes = state.tool_passes,
            answer_len = answer.len(),
            "Turn complete"
        );

        Ok(TurnOutcome {
            turn_id,
            answer,
            plan,
            evidence,
            visited,
            trailing: state.trailing,
        })
    }

    async fn fetch_summaries(&self, request: &TurnRequest) -> Vec<DocumentSummary> {
        if request.attachments.is_empty() {
            return Vec::new();
        }
        let Some(store) = &self.summaries else {
            warn!(
                patient_id = %request.patient_id,
                attachments = request.attachments.len(),
                "Documents attached but no summary store configured"
            );
            return Vec::new();
        };

        let mut summaries = Vec::new();
        for document_id in &request.attachments {
            match store.get(document_id).await {
                Ok(text) => summaries.push(DocumentSummary {
                    document_id: document_id.clone(),
                    text,
                }),
                Err(e) => warn!(
                    patient_id = %request.patient_id,
                    document_id = %document_id,
                    error = %e,
                    "Summary unavailable, skipping"
                ),
            }
        }
        summaries
    }

    // ─── Nodes ──────────────────────────────────────────────────────────────

    async fn call_model(&self, scope: &TurnScope<'_>, mut state: AgentState) -> Result<Transition> {
        let request = scope.request;
        let query = state
            .latest_user_text()
            .unwrap_or_else(|| request.question.clone());
        let memories = state
            .memory
            .recall(&request.patient_id, &query, self.config.memory_k)
            .await?;

        let curated = self
            .curator
            .curate(CurationInput {
                history: &state.messages,
                memories: &memories,
                evidence: scope.evidence,
                facts: scope.facts,
                summaries: scope.summaries,
            })
            .await?;

        let handle = self.models.get(ModelTier::Advanced)?;
        let model_request = handle
            .request(state.messages.clone())
            .with_system(dialogue_prompt(&curated, scope.language))
            .with_tools(self.tools.to_llm_definitions());
        let response = handle.complete(model_request).await?;

        let message = single_tool_call(response.content);
        let wants_tool = message.has_tool_use();
        state.messages.push(message);

        if wants_tool {
            return Ok(Transition::to(state, Node::Tools));
        }

        notify(
            &self.status,
            &request.user_id,
            StatusEvent::new(
                StatusKind::GeneratingResponse,
                &request.patient_id,
                request.turn_id,
            ),
        )
        .await;
        Ok(Transition::to(state, Node::Prettify))
    }

    async fn run_tool(&self, scope: &TurnScope<'_>, mut state: AgentState) -> Result<Transition> {
        if state.tool_passes >= self.config.max_tool_passes {
            return Err(AgentError::MaxToolPasses(self.config.max_tool_passes));
        }

        let request = scope.request;
        let call = state
            .messages
            .last()
            .and_then(|m| m.tool_uses().into_iter().next())
            .ok_or_else(|| AgentError::internal("tools node reached without a tool call"))?;

        notify(
            &self.status,
            &request.user_id,
            StatusEvent::action(&request.patient_id, request.turn_id, &call.name, &call.input),
        )
        .await;

        let ctx = ToolContext::new(request.turn_id, &request.patient_id)
            .with_language(scope.language)
            .with_container(scope.container);
        info!(
            turn_id = %request.turn_id,
            patient_id = %request.patient_id,
            tool = %call.name,
            "Executing tool"
        );
        let result = self.tools.execute(&call.name, call.input, &ctx).await?;

        state
            .messages
            .push(Message::tool_result(call.id, result.to_llm_content()));
        state.tool_passes += 1;
        Ok(Transition::to(state, Node::CallModel))
    }

    fn format_answer(&self, mut state: AgentState) -> Result<Transition> {
        let raw = state
            .messages
            .last()
            .filter(|m| m.role == Role::Assistant)
            .map(Message::text)
            .ok_or_else(|| AgentError::internal("prettify reached without a model answer"))?;
        state.answer = Some(prettify(&raw));
        Ok(Transition::to(state, Node::SaveContext))
    }

    async fn save_context(&self, scope: &TurnScope<'_>, mut state: AgentState) -> Transition {
        let request = scope.request;
        let answer = state.answer.clone().unwrap_or_default();

        notify(
            &self.status,
            &request.user_id,
            StatusEvent::answer(&request.patient_id, request.turn_id, &answer),
        )
        .await;
        notify(
            &self.status,
            &request.user_id,
            StatusEvent::new(
                StatusKind::SuggestionsPending,
                &request.patient_id,
                request.turn_id,
            ),
        )
        .await;

        let work = TrailingWork {
            models: self.models.clone(),
            memory: state.memory.clone(),
            status: self.status.clone(),
            user_id: request.user_id.clone(),
            patient_id: request.patient_id.clone(),
            turn_id: request.turn_id,
            question: request.question.clone(),
            answer,
            messages: state.messages.clone(),
            language: scope.language.to_string(),
            max_suggestions: self.config.max_suggestions,
        };
        state.trailing = Some(tokio::spawn(work.run()));
        Transition::to(state, Node::End)
    }
}

/// Keep the text blocks and only the first tool call of a model response.
fn single_tool_call(content: Vec<ContentBlock>) -> Message {
    let mut seen_tool = false;
    let blocks = content
        .into_iter()
        .filter(|block| match block {
            ContentBlock::ToolUse { .. } if seen_tool => false,
            ContentBlock::ToolUse { .. } => {
                seen_tool = true;
                true
            }
            _ => true,
        })
        .collect();
    Message::assistant_blocks(blocks)
}

fn dialogue_prompt(curated: &CuratedContext, language: &str) -> String {
    let mut prompt = String::from(
        "You are a careful assistant answering questions about one patient's medical record.\n\
         Answer from the context below. Keep every citation label exactly as written, \
         e.g. [cbc.pdf, 2024-03-07] or [scan.pdf, undated]. If the record does not contain \
         the answer, say so. Use tools only for general medical information or trial lookups, \
         never for facts about this patient.\n\n",
    );
    prompt.push_str("## Context\n");
    prompt.push_str(&curated.text);
    if !curated.citations.is_empty() {
        prompt.push_str("\n\n## Citable sources\n");
        prompt.push_str(&curated.citations.join("\n"));
    }
    prompt.push_str(&format!(
        "\n\nCurrent time: {}\nRespond in the language with code '{}'.",
        Utc::now().format("%Y-%m-%d %H:%M UTC"),
        language
    ));
    prompt
}

async fn notify(status: &SharedStatusChannel, user_id: &str, event: StatusEvent) {
    let label = event.status;
    if let Err(e) = status.push(user_id, event).await {
        warn!(user_id, status = ?label, error = %e, "Status push failed");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trailing work
// ─────────────────────────────────────────────────────────────────────────────

/// Book-keeping that runs after the answer is delivered. Failures are logged.
struct TrailingWork {
    models: Arc<ProviderRegistry>,
    memory: MemoryStore,
    status: SharedStatusChannel,
    user_id: String,
    patient_id: String,
    turn_id: TurnId,
    question: String,
    answer: String,
    messages: Vec<Message>,
    language: String,
    max_suggestions: usize,
}

impl TrailingWork {
    async fn run(self) {
        match self
            .memory
            .remember(&self.patient_id, &self.question, &self.answer)
            .await
        {
            Ok(memory_id) => {
                debug!(turn_id = %self.turn_id, patient_id = %self.patient_id, %memory_id, "Turn remembered")
            }
            Err(e) => warn!(
                turn_id = %self.turn_id,
                patient_id = %self.patient_id,
                error = %e,
                "Memory write failed"
            ),
        }

        let suggestions = match self.suggest().await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                warn!(
                    turn_id = %self.turn_id,
                    patient_id = %self.patient_id,
                    error = %e,
                    "Suggestion generation failed"
                );
                Vec::new()
            }
        };

        notify(
            &self.status,
            &self.user_id,
            StatusEvent::suggestions(&self.patient_id, self.turn_id, &suggestions),
        )
        .await;
    }

    async fn suggest(&self) -> Result<Vec<String>> {
        if self.max_suggestions == 0 {
            return Ok(Vec::new());
        }
        let handle = self.models.get(ModelTier::Fast)?;

        let mut messages = self.messages.clone();
        messages.push(Message::user(format!(
            "Suggest up to {} short follow-up questions I could ask next about this record. \
             Reply with a JSON array of strings only.",
            self.max_suggestions
        )));
        let request = handle.request(messages).with_system(format!(
            "You write follow-up questions for a patient reviewing their medical record. \
             Write them in the language with code '{}'.",
            self.language
        ));

        let output = handle.complete(request).await?.text();
        let slice = json_array_slice(&output)
            .ok_or_else(|| AgentError::internal("suggestion output has no JSON array"))?;
        let mut suggestions: Vec<String> = serde_json::from_str::<Vec<String>>(slice)?
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        suggestions.truncate(self.max_suggestions);
        Ok(suggestions)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`AgentGraph`].
#[derive(Default)]
pub struct AgentGraphBuilder {
    models: Option<Arc<ProviderRegistry>>,
    embedder: Option<SharedEmbedder>,
    chunk_index: Option<SharedIndex>,
    memory_index: Option<SharedIndex>,
    tools: ToolRegistry,
    status: Option<SharedStatusChannel>,
    summaries: Option<SharedSummaryStore>,
    config: GraphConfig,
}

impl AgentGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(mut self, models: ProviderRegistry) -> Self {
        self.models = Some(Arc::new(models));
        self
    }

    pub fn with_shared_models(mut self, models: Arc<ProviderRegistry>) -> Self {
        self.models = Some(models);
        self
    }

    /// Embedder used for both chunk retrieval and memory.
    pub fn with_embedder(mut self, embedder: SharedEmbedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_chunk_index(mut self, index: SharedIndex) -> Self {
        self.chunk_index = Some(index);
        self
    }

    pub fn with_memory_index(mut self, index: SharedIndex) -> Self {
        self.memory_index = Some(index);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool<T: crate::tool::Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_status(mut self, status: SharedStatusChannel) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_summaries(mut self, summaries: SharedSummaryStore) -> Self {
        self.summaries = Some(summaries);
        self
    }

    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<AgentGraph> {
        let models = self
            .models
            .ok_or_else(|| AgentError::Config("model registry is required".to_string()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| AgentError::Config("embedder is required".to_string()))?;
        let chunk_index = self
            .chunk_index
            .ok_or_else(|| AgentError::Config("chunk index is required".to_string()))?;
        let memory_index = self
            .memory_index
            .ok_or_else(|| AgentError::Config("memory index is required".to_string()))?;
        let status = self
            .status
            .ok_or_else(|| AgentError::Config("status channel is required".to_string()))?;

        Ok(AgentGraph {
            classifier: IntentClassifier::new(models.clone()),
            retriever: HybridRetriever::new(embedder.clone(), chunk_index),
            facts: FactExtractor::new(models.clone()),
            curator: ContextCurator::new(models.clone()),
            memory: MemoryStore::new(embedder, memory_index),
            models,
            tools: Arc::new(self.tools),
            status,
            summaries: self.summaries,
            config: self.config,
        })
    }
}
