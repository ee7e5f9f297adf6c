//! Structured fact extraction from selected evidence.

use std::sync::Arc;

use chartwise_llm::{Message, ModelTier, ProviderRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::text::json_array_slice;
use crate::types::{Chunk, StructuredFact};

/// Quality/cost trade-off for fact extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityMode {
    #[default]
    Fast,
    Advanced,
}

impl QualityMode {
    pub fn tier(&self) -> ModelTier {
        match self {
            QualityMode::Fast => ModelTier::Fast,
            QualityMode::Advanced => ModelTier::Advanced,
        }
    }
}

const SYSTEM_PROMPT: &str = "\
You extract discrete clinical facts from excerpts of a patient's medical documents.
Use only the excerpts provided. Do not infer values that are not written there.
Return a JSON array. Each element is an object with the keys:
  \"fact\": what was measured, observed or prescribed
  \"value\": the value as written, or null
  \"unit\": the unit, or null
  \"date\": the date the value applies to (YYYY-MM-DD), or null
  \"source\": the document name from the excerpt label
Return [] when the excerpts contain no relevant facts. Output the JSON only.";

/// Pulls `{fact, value, unit, date, source}` records out of evidence.
///
/// Extraction is a degradation point: a failed call or unparseable output
/// yields an empty list and the turn continues.
#[derive(Debug, Clone)]
pub struct FactExtractor {
    models: Arc<ProviderRegistry>,
}

impl FactExtractor {
    pub fn new(models: Arc<ProviderRegistry>) -> Self {
        Self { models }
    }

    pub async fn extract(
        &self,
        evidence: &[Chunk],
        question: &str,
        patient_id: &str,
        mode: QualityMode,
    ) -> Vec<StructuredFact> {
        if evidence.is_empty() {
            return Vec::new();
        }

        let handle = match self.models.get(mode.tier()) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(patient_id, error = %e, "No model for fact extraction");
                return Vec::new();
            }
        };

        let request = handle
            .request(vec![Message::user(format_prompt(evidence, question))])
            .with_system(SYSTEM_PROMPT)
            .with_temperature(0.0);

        let response = match handle.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(patient_id, error = %e, "Fact extraction call failed");
                return Vec::new();
            }
        };

        match parse_facts(&response.text()) {
            Some(facts) => {
                debug!(patient_id, facts = facts.len(), mode = ?mode, "Facts extracted");
                facts
            }
            None => {
                warn!(patient_id, "Fact extraction output was not a JSON array of facts");
                Vec::new()
            }
        }
    }
}

/// Evidence blocks labelled with document name and report date.
pub fn format_evidence_blocks(evidence: &[Chunk]) -> String {
    evidence
        .iter()
        .map(|c| {
            format!(
                "[Document: {} | Report date: {}]\n{}",
                c.filename,
                c.date_label(),
                c.content.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_prompt(evidence: &[Chunk], question: &str) -> String {
    format!(
        "Question: {}\n\nExcerpts:\n\n{}",
        question.trim(),
        format_evidence_blocks(evidence)
    )
}

#[derive(Debug, Deserialize)]
struct RawFact {
    #[serde(default)]
    fact: Value,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    unit: Value,
    #[serde(default)]
    date: Value,
    #[serde(default)]
    source: Value,
}

/// Parse the model's reply. `None` when it is not a JSON array of objects.
///
/// Numbers are kept as their textual form; entries without a `fact` are
/// dropped.
pub fn parse_facts(output: &str) -> Option<Vec<StructuredFact>> {
    let slice = json_array_slice(output)?;
    let raw: Vec<RawFact> = serde_json::from_str(slice).ok()?;
    Some(
        raw.into_iter()
            .filter_map(|r| {
                let fact = scalar(r.fact)?;
                Some(StructuredFact {
                    fact,
                    value: scalar(r.value),
                    unit: scalar(r.unit),
                    date: scalar(r.date),
                    source: scalar(r.source).unwrap_or_default(),
                })
            })
            .collect(),
    )
}

fn scalar(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
