//! User-addressed status events.
//!
//! Delivery is push-only and best-effort: the graph logs a failed push and
//! carries on.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::types::TurnId;

/// Status label of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    GeneratingResponse,
    Action,
    Answer,
    SuggestionsPending,
    Suggestions,
    Error,
}

impl StatusKind {
    /// Whether no further events follow for the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusKind::Suggestions | StatusKind::Error)
    }
}

/// One JSON event: `{timestamp, status, patientId, turnId, ...payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub timestamp: DateTime<Utc>,
    pub status: StatusKind,
    #[serde(rename = "patientId")]
    pub patient_id: String,
    #[serde(rename = "turnId")]
    pub turn_id: TurnId,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl StatusEvent {
    pub fn new(status: StatusKind, patient_id: impl Into<String>, turn_id: TurnId) -> Self {
        Self {
            timestamp: Utc::now(),
            status,
            patient_id: patient_id.into(),
            turn_id,
            payload: Map::new(),
        }
    }

    /// Add a payload field.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// `action: {name, arguments}`.
    pub fn action(patient_id: &str, turn_id: TurnId, name: &str, arguments: &Value) -> Self {
        Self::new(StatusKind::Action, patient_id, turn_id)
            .with("action", json!({ "name": name, "arguments": arguments }))
    }

    pub fn answer(patient_id: &str, turn_id: TurnId, answer: &str) -> Self {
        Self::new(StatusKind::Answer, patient_id, turn_id).with("answer", json!(answer))
    }

    pub fn suggestions(patient_id: &str, turn_id: TurnId, suggestions: &[String]) -> Self {
        Self::new(StatusKind::Suggestions, patient_id, turn_id)
            .with("suggestions", json!(suggestions))
    }

    pub fn error(patient_id: &str, turn_id: TurnId, message: &str) -> Self {
        Self::new(StatusKind::Error, patient_id, turn_id).with("message", json!(message))
    }

    /// Read a string payload field.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Push-only channel addressed by user id.
#[async_trait]
pub trait StatusChannel: Send + Sync {
    async fn push(&self, user_id: &str, event: StatusEvent) -> Result<()>;
}

pub type SharedStatusChannel = Arc<dyn StatusChannel>;

// ─────────────────────────────────────────────────────────────────────────────
// Broadcast channel
// ─────────────────────────────────────────────────────────────────────────────

/// Fan-out over a tokio broadcast channel. Subscribers filter by user id.
#[derive(Debug, Clone)]
pub struct BroadcastStatusChannel {
    tx: broadcast::Sender<(String, StatusEvent)>,
}

impl BroadcastStatusChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Receive events addressed to `user_id`.
    pub fn subscribe(&self, user_id: impl Into<String>) -> StatusSubscription {
        StatusSubscription {
            user_id: user_id.into(),
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for BroadcastStatusChannel {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl StatusChannel for BroadcastStatusChannel {
    async fn push(&self, user_id: &str, event: StatusEvent) -> Result<()> {
        if self.tx.send((user_id.to_string(), event)).is_err() {
            debug!(user_id, "Status event dropped, no subscribers");
        }
        Ok(())
    }
}

/// One user's view of a [`BroadcastStatusChannel`].
#[derive(Debug)]
pub struct StatusSubscription {
    user_id: String,
    rx: broadcast::Receiver<(String, StatusEvent)>,
}

impl StatusSubscription {
    /// Next event for this user. `None` once the channel is closed.
    ///
    /// Lagged events are skipped.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        loop {
            match self.rx.recv().await {
                Ok((user, event)) if user == self.user_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(user_id = %self.user_id, skipped, "Status subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Recording channel
// ─────────────────────────────────────────────────────────────────────────────

/// Captures every pushed event. Optionally fails every push.
#[derive(Debug, Default)]
pub struct RecordingStatusChannel {
    events: Mutex<Vec<(String, StatusEvent)>>,
    fail: bool,
}

impl RecordingStatusChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel that records nothing and rejects every push.
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Recorded `(user_id, event)` pairs, in push order.
    pub fn events(&self) -> Vec<(String, StatusEvent)> {
        self.events.lock().clone()
    }

    /// Recorded status labels, in push order.
    pub fn statuses(&self) -> Vec<StatusKind> {
        self.events.lock().iter().map(|(_, e)| e.status).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl StatusChannel for RecordingStatusChannel {
    async fn push(&self, user_id: &str, event: StatusEvent) -> Result<()> {
        if self.fail {
            return Err(AgentError::Status("recording channel rejects pushes".into()));
        }
        self.events.lock().push((user_id.to_string(), event));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let turn = TurnId::new();
        let event = StatusEvent::action("p1", turn, "web_search", &json!({"query": "statins"}));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["status"], "action");
        assert_eq!(value["patientId"], "p1");
        assert_eq!(value["turnId"], turn.to_string());
        assert_eq!(value["action"]["name"], "web_search");
        assert_eq!(value["action"]["arguments"]["query"], "statins");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_status_labels() {
        let labels: Vec<String> = [
            StatusKind::GeneratingResponse,
            StatusKind::SuggestionsPending,
            StatusKind::Error,
        ]
        .iter()
        .map(|k| serde_json::to_value(k).unwrap().as_str().unwrap().to_string())
        .collect();
        assert_eq!(labels, vec!["generating_response", "suggestions_pending", "error"]);
        assert!(StatusKind::Suggestions.is_terminal());
        assert!(!StatusKind::Answer.is_terminal());
    }

    #[test]
    fn test_suggestions_payload() {
        let event = StatusEvent::suggestions("p1", TurnId::new(), &["Why?".to_string()]);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["suggestions"], json!(["Why?"]));
    }

    #[tokio::test]
    async fn test_broadcast_filters_by_user() {
        let channel = BroadcastStatusChannel::default();
        let mut alice = channel.subscribe("alice");
        let turn = TurnId::new();

        channel.push("bob", StatusEvent::answer("p2", turn, "hi bob")).await.unwrap();
        channel.push("alice", StatusEvent::answer("p1", turn, "hi alice")).await.unwrap();

        let event = alice.recv().await.unwrap();
        assert_eq!(event.payload_str("answer"), Some("hi alice"));
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_ok() {
        let channel = BroadcastStatusChannel::default();
        let event = StatusEvent::answer("p1", TurnId::new(), "lost");
        assert!(channel.push("nobody", event).await.is_ok());
    }

    #[tokio::test]
    async fn test_recording_channel() {
        let channel = RecordingStatusChannel::new();
        let turn = TurnId::new();
        channel.push("u1", StatusEvent::answer("p1", turn, "a")).await.unwrap();
        channel
            .push("u1", StatusEvent::new(StatusKind::SuggestionsPending, "p1", turn))
            .await
            .unwrap();
        assert_eq!(channel.statuses(), vec![StatusKind::Answer, StatusKind::SuggestionsPending]);
        assert_eq!(channel.events()[0].0, "u1");

        let failing = RecordingStatusChannel::failing();
        assert!(failing.push("u1", StatusEvent::answer("p1", turn, "a")).await.is_err());
        assert!(failing.is_empty());
    }
}
