//! Detached turn execution.
//!
//! [`TurnRunner::submit`] acknowledges a question with its [`TurnId`] right
//! away and runs the graph on a spawned task. Results and progress reach the
//! user only through the status channel.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::graph::{AgentGraph, TurnOutcome, TurnRequest};
use crate::status::{SharedStatusChannel, StatusEvent};
use crate::types::TurnId;

/// Message pushed to the user when a turn aborts.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong while answering. Please try again.";

/// Acknowledgement of a submitted turn.
#[derive(Debug)]
pub struct TurnTicket {
    pub turn_id: TurnId,
    /// Resolves to the outcome, or `None` when the turn aborted.
    pub handle: JoinHandle<Option<TurnOutcome>>,
}

/// Spawns one independent graph execution per question.
#[derive(Clone)]
pub struct TurnRunner {
    graph: Arc<AgentGraph>,
    status: SharedStatusChannel,
}

impl TurnRunner {
    pub fn new(graph: Arc<AgentGraph>, status: SharedStatusChannel) -> Self {
        Self { graph, status }
    }

    pub fn graph(&self) -> &AgentGraph {
        &self.graph
    }

    /// Start a turn without waiting for it.
    pub fn submit(&self, request: TurnRequest) -> TurnTicket {
        let turn_id = request.turn_id;
        let graph = self.graph.clone();
        let status = self.status.clone();

        let handle = tokio::spawn(async move {
            let user_id = request.user_id.clone();
            let patient_id = request.patient_id.clone();
            match graph.run_turn(request).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    error!(%turn_id, patient_id = %patient_id, error = %e, "Turn aborted");
                    let event = StatusEvent::error(&patient_id, turn_id, GENERIC_FAILURE_MESSAGE);
                    if let Err(push_err) = status.push(&user_id, event).await {
                        warn!(%turn_id, error = %push_err, "Failed to deliver error status");
                    }
                    None
                }
            }
        });

        TurnTicket { turn_id, handle }
    }
}

impl std::fmt::Debug for TurnRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnRunner")
            .field("graph", &self.graph)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{RecordingStatusChannel, StatusKind};
    use chartwise_index::InMemoryVectorIndex;
    use chartwise_llm::{MockBackend, MockEmbedder, ModelHandle, ProviderRegistry};

    fn runner(embedder: MockEmbedder, fast: MockBackend) -> (TurnRunner, Arc<RecordingStatusChannel>) {
        let status = Arc::new(RecordingStatusChannel::new());
        let graph = AgentGraph::builder()
            .with_models(ProviderRegistry::single(ModelHandle::new(Arc::new(fast), "m")))
            .with_embedder(Arc::new(embedder))
            .with_chunk_index(Arc::new(InMemoryVectorIndex::new()))
            .with_memory_index(Arc::new(InMemoryVectorIndex::new()))
            .with_status(status.clone())
            .build()
            .unwrap();
        (TurnRunner::new(Arc::new(graph), status.clone()), status)
    }

    #[tokio::test]
    async fn test_failed_turn_pushes_generic_error() {
        let (runner, status) = runner(
            MockEmbedder::failing("embedding service down"),
            MockBackend::with_text("FACTUAL"),
        );
        let request = TurnRequest::new("u1", "p1", "What was my LDL?");
        let expected_turn = request.turn_id;

        let ticket = runner.submit(request);
        assert_eq!(ticket.turn_id, expected_turn);
        assert!(ticket.handle.await.unwrap().is_none());

        let events = status.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "u1");
        assert_eq!(events[0].1.status, StatusKind::Error);
        assert_eq!(events[0].1.turn_id, expected_turn);
        assert_eq!(events[0].1.payload_str("message"), Some(GENERIC_FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn test_turns_run_independently() {
        let (runner, status) = runner(MockEmbedder::default(), MockBackend::new(Vec::new()));
        let a = runner.submit(TurnRequest::new("u1", "p1", "first"));
        let b = runner.submit(TurnRequest::new("u2", "p2", "second"));
        assert_ne!(a.turn_id, b.turn_id);

        // No scripted model responses: both turns abort at curation.
        assert!(a.handle.await.unwrap().is_none());
        assert!(b.handle.await.unwrap().is_none());
        let mut users: Vec<String> = status.events().into_iter().map(|(u, _)| u).collect();
        users.sort();
        assert_eq!(users, vec!["u1", "u2"]);
    }
}
