//! Context curation.
//!
//! Conversation, evidence, facts, document summaries and recalled memories
//! are merged by the advanced model into one citation-annotated text blob.
//! The model is told which source wins when they disagree:
//!
//! 1. conversation history, for demographics and recent user-stated facts
//! 2. evidence chunks and structured facts, for clinical values (cited)
//! 3. document summaries, for background
//! 4. long-term memory, for continuity with earlier turns
//!
//! Demographic statements from the conversation are then re-checked and
//! appended verbatim if the model dropped them.

use std::sync::{Arc, LazyLock};

use chartwise_llm::{ContentBlock, Message, ModelTier, ProviderRegistry, Role};
use regex::Regex;
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::memory::MemoryHit;
use crate::summaries::DocumentSummary;
use crate::types::{Chunk, StructuredFact};

/// Heading under which missing demographic lines are appended.
pub const PATIENT_STATED_HEADING: &str = "Patient-stated context:";

const SYSTEM_PROMPT: &str = "\
You prepare the grounding context for a medical-record assistant. Merge the
sections you are given into one concise briefing for answering the latest
user message.

Source-of-truth hierarchy, highest first:
1. Conversation: authoritative for the patient's demographics and anything the
   user stated recently. Keep demographic statements word for word.
2. Evidence and structured facts: authoritative for clinical values. Every
   clinical value you take from them must carry the citation label shown with
   its excerpt, exactly as written, e.g. [cbc.pdf, 2024-03-07] or
   [scan.pdf, undated]. Never cite a bare filename or reformat the date.
3. Document summaries: general background only.
4. Prior exchanges: continuity with earlier turns; never overrides 1 or 2.

When sources conflict, follow the hierarchy and mention the conflict.
Output plain text only.";

/// Inputs to one curation call.
#[derive(Debug, Clone, Copy)]
pub struct CurationInput<'a> {
    pub history: &'a [Message],
    pub memories: &'a [MemoryHit],
    pub evidence: &'a [Chunk],
    pub facts: &'a [StructuredFact],
    pub summaries: &'a [DocumentSummary],
}

/// The synthesized grounding text for one model pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CuratedContext {
    pub text: String,
    /// Citation labels of the evidence handed to the curator.
    pub citations: Vec<String>,
}

/// Runs the curation call. Its failure is fatal to the turn.
#[derive(Debug, Clone)]
pub struct ContextCurator {
    models: Arc<ProviderRegistry>,
}

impl ContextCurator {
    pub fn new(models: Arc<ProviderRegistry>) -> Self {
        Self { models }
    }

    pub async fn curate(&self, input: CurationInput<'_>) -> Result<CuratedContext> {
        let handle = self.models.get(ModelTier::Advanced)?;
        let request = handle
            .request(vec![Message::user(render_sections(&input))])
            .with_system(SYSTEM_PROMPT)
            .with_temperature(0.0);

        let response = handle.complete(request).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(AgentError::Curation("model returned an empty context".into()));
        }

        let demographics = extract_demographics(input.history);
        let text = ensure_demographics(text.trim(), &demographics);

        let mut citations: Vec<String> = Vec::new();
        for label in input.evidence.iter().map(Chunk::citation) {
            if !citations.contains(&label) {
                citations.push(label);
            }
        }

        debug!(
            evidence = input.evidence.len(),
            facts = input.facts.len(),
            memories = input.memories.len(),
            summaries = input.summaries.len(),
            demographics = demographics.len(),
            "Context curated"
        );
        Ok(CuratedContext { text, citations })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompt sections
// ─────────────────────────────────────────────────────────────────────────────

fn or_none(body: String) -> String {
    if body.is_empty() { "(none)".to_string() } else { body }
}

/// Render the curator's input sections.
pub fn render_sections(input: &CurationInput<'_>) -> String {
    let conversation = input
        .history
        .iter()
        .filter_map(render_message)
        .collect::<Vec<_>>()
        .join("\n");

    let evidence = input
        .evidence
        .iter()
        .map(|c| {
            let kind = c
                .document_type
                .as_deref()
                .map(|t| format!(" ({t})"))
                .unwrap_or_default();
            format!("{}{}\n{}", c.citation(), kind, c.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let facts = input
        .facts
        .iter()
        .map(|f| match f.citation(input.evidence) {
            Some(label) => format!("- {} {}", f.render(), label),
            None if !f.source.is_empty() => format!("- {} (source: {})", f.render(), f.source),
            None => format!("- {}", f.render()),
        })
        .collect::<Vec<_>>()
        .join("\n");

    let summaries = input
        .summaries
        .iter()
        .map(|s| format!("### {}\n{}", s.document_id, s.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    let memories = input
        .memories
        .iter()
        .map(|m| match m.created_at {
            Some(at) => format!("({})\n{}", at.format("%Y-%m-%d"), m.text),
            None => m.text.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "## Conversation\n{}\n\n## Evidence\n{}\n\n## Structured facts\n{}\n\n\
         ## Document summaries\n{}\n\n## Prior exchanges\n{}",
        or_none(conversation),
        or_none(evidence),
        or_none(facts),
        or_none(summaries),
        or_none(memories),
    )
}

fn render_message(message: &Message) -> Option<String> {
    let speaker = match message.role {
        Role::User => "User",
        Role::Assistant => "Assistant",
    };
    let parts: Vec<String> = message
        .content
        .blocks()
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } if !text.trim().is_empty() => {
                Some(format!("{speaker}: {}", text.trim()))
            }
            ContentBlock::ToolUse { name, input, .. } => {
                Some(format!("Assistant requested tool {name} with {input}"))
            }
            ContentBlock::ToolResult { content, .. } => {
                Some(format!("Tool result: {}", content.trim()))
            }
            _ => None,
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Demographics
// ─────────────────────────────────────────────────────────────────────────────

static DEMOGRAPHIC_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // age
        r"(?i)\b\d{1,3}[- ]?(?:years?|yrs?)[- ]?old\b",
        r"(?i)\b\d{1,3}\s?(?:yo|y/o)\b",
        r"(?i)\bage[d:]?\s*\d{1,3}\b",
        r"(?i)\bI(?:'m| am) \d{1,3}\b",
        // sex / gender
        r"(?i)\b(?:male|female|man|woman|non-binary|nonbinary|transgender|gender|sex)\b",
        // date of birth
        r"(?i)\b(?:date of birth|dob|born on|born in)\b",
        // weight
        r"(?i)\b(?:weigh|weighs|weight)\b",
        r"(?i)\b\d+(?:\.\d+)?\s?(?:kg|kgs|lb|lbs|pounds)\b",
        // height
        r"(?i)\b(?:height|tall)\b",
        r"(?i)\b\d+(?:\.\d+)?\s?cm\b",
        r#"\b\d'\s?\d{1,2}(?:"|''|\b)"#,
        // pregnancy
        r"(?i)\bpregnan\w*",
        // allergies
        r"(?i)\ballerg\w*",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Sentences the user wrote that state demographics, in order, deduplicated.
pub fn extract_demographics(history: &[Message]) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for message in history.iter().filter(|m| m.role == Role::User) {
        for block in message.content.blocks() {
            let ContentBlock::Text { text } = block else {
                continue;
            };
            for sentence in split_sentences(&text) {
                let is_demographic = DEMOGRAPHIC_PATTERNS.iter().any(|re| re.is_match(sentence));
                if is_demographic && !lines.iter().any(|l| l == sentence) {
                    lines.push(sentence.to_string());
                }
            }
        }
    }
    lines
}

/// Append every line of `demographics` not already present verbatim.
pub fn ensure_demographics(text: &str, demographics: &[String]) -> String {
    let missing: Vec<&String> = demographics.iter().filter(|d| !text.contains(d.as_str())).collect();
    if missing.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() + 64);
    out.push_str(text);
    out.push_str("\n\n");
    out.push_str(PATIENT_STATED_HEADING);
    for line in missing {
        out.push_str("\n- ");
        out.push_str(line);
    }
    out
}

/// Split on newlines and on `.`, `!` or `?` followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    for line in text.lines() {
        let mut start = 0;
        let mut chars = line.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            let at_boundary = matches!(c, '.' | '!' | '?')
                && chars.peek().is_none_or(|(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                sentences.push(line[start..end].trim());
                start = end;
            }
        }
        sentences.push(line[start..].trim());
    }
    sentences.retain(|s| !s.is_empty());
    sentences
}
