//! Clinical domain types shared across the pipeline.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use chartwise_index::ScoredRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for one question/answer turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(Uuid);

impl TurnId {
    /// Create a new random turn ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunk metadata keys
// ─────────────────────────────────────────────────────────────────────────────

/// Metadata keys written by ingestion and read back at retrieval.
pub mod meta {
    pub const PATIENT_ID: &str = "patientId";
    pub const DOCUMENT_ID: &str = "documentId";
    pub const FILENAME: &str = "filename";
    pub const REPORT_DATE: &str = "reportDate";
    pub const DATE_STATUS: &str = "dateStatus";
    pub const DOCUMENT_TYPE: &str = "documentType";
    pub const CREATED_AT: &str = "createdAt";
    pub const KIND: &str = "kind";
}

// ─────────────────────────────────────────────────────────────────────────────
// Report dates
// ─────────────────────────────────────────────────────────────────────────────

/// How a chunk's report date was established by ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DateStatus {
    /// Read directly from the document.
    Exact,
    /// Inferred from surrounding context.
    Inferred,
    /// The document carries no date.
    Missing,
    #[default]
    Unknown,
}

impl DateStatus {
    /// Parse the ingestion label. Anything unrecognised is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "exact" => Self::Exact,
            "inferred" => Self::Inferred,
            "missing" => Self::Missing,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Inferred => "inferred",
            Self::Missing => "missing",
            Self::Unknown => "unknown",
        }
    }
}

/// Parse a raw report date.
///
/// Accepts `YYYY-MM-DD`, RFC 3339, `YYYY-MM-DDTHH:MM:SS[.fff]` and
/// `YYYY/MM/DD`. Anything else is `None`, which callers treat exactly like a
/// missing date.
pub fn parse_report_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y/%m/%d").ok()
}

/// Citation label for a document: `[filename, YYYY-MM-DD]`, or
/// `[filename, undated]` when the date is absent or unparseable.
pub fn citation_label(filename: &str, report_date: Option<&str>) -> String {
    match report_date.and_then(parse_report_date) {
        Some(date) => format!("[{}, {}]", filename, date.format("%Y-%m-%d")),
        None => format!("[{}, undated]", filename),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunk
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of indexed clinical text, as returned by retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub document_id: String,
    pub filename: String,
    /// Raw report date as stored by ingestion.
    pub report_date: Option<String>,
    pub date_status: DateStatus,
    pub document_type: Option<String>,
    pub patient_id: String,
    pub similarity: f32,
}

impl Chunk {
    /// Build a chunk from an index hit.
    ///
    /// A missing `documentId` falls back to the record's source tag, and a
    /// missing filename to the document id.
    pub fn from_record(record: ScoredRecord) -> Self {
        let document_id = record
            .meta_str(meta::DOCUMENT_ID)
            .unwrap_or(&record.source)
            .to_string();
        let filename = record
            .meta_str(meta::FILENAME)
            .map(str::to_string)
            .unwrap_or_else(|| document_id.clone());
        let report_date = record
            .meta_str(meta::REPORT_DATE)
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string);
        let date_status = record
            .meta_str(meta::DATE_STATUS)
            .map(DateStatus::from_label)
            .unwrap_or_default();
        let document_type = record.meta_str(meta::DOCUMENT_TYPE).map(str::to_string);
        let patient_id = record
            .meta_str(meta::PATIENT_ID)
            .unwrap_or_default()
            .to_string();

        Self {
            id: record.id,
            content: record.content,
            document_id,
            filename,
            report_date,
            date_status,
            document_type,
            patient_id,
            similarity: record.score,
        }
    }

    /// Parsed report date, if any.
    pub fn date(&self) -> Option<NaiveDate> {
        self.report_date.as_deref().and_then(parse_report_date)
    }

    /// The exact citation string for this chunk.
    pub fn citation(&self) -> String {
        citation_label(&self.filename, self.report_date.as_deref())
    }

    /// Human-readable date for prompt labels.
    pub fn date_label(&self) -> String {
        self.date()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "undated".to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Structured facts
// ─────────────────────────────────────────────────────────────────────────────

/// A discrete clinical datum extracted from evidence. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredFact {
    pub fact: String,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub date: Option<String>,
    /// Filename of the evidence block the fact came from.
    pub source: String,
}

impl StructuredFact {
    /// Citation of the source document, when it is one of `evidence`.
    pub fn citation(&self, evidence: &[Chunk]) -> Option<String> {
        evidence
            .iter()
            .find(|c| c.filename == self.source || c.document_id == self.source)
            .map(Chunk::citation)
    }

    /// One-line rendering: `fact: value unit (date)`.
    pub fn render(&self) -> String {
        let mut line = self.fact.clone();
        if let Some(value) = &self.value {
            line.push_str(": ");
            line.push_str(value);
            if let Some(unit) = &self.unit {
                line.push(' ');
                line.push_str(unit);
            }
        }
        if let Some(date) = &self.date {
            line.push_str(&format!(" ({})", date));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scored(metadata: serde_json::Value) -> ScoredRecord {
        ScoredRecord {
            id: "c1".into(),
            content: "Hemoglobin 13.2 g/dL".into(),
            source: "doc-1".into(),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
            score: 0.8,
        }
    }

    #[test]
    fn test_parse_report_date_shapes() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 7);
        assert_eq!(parse_report_date("2024-03-07"), expected);
        assert_eq!(parse_report_date("2024-03-07T10:15:00Z"), expected);
        assert_eq!(parse_report_date("2024-03-07T10:15:00+02:00"), expected);
        assert_eq!(parse_report_date("2024-03-07T10:15:00"), expected);
        assert_eq!(parse_report_date("2024-03-07T10:15:00.250"), expected);
        assert_eq!(parse_report_date("2024/03/07"), expected);
        assert_eq!(parse_report_date(" 2024-03-07 "), expected);
    }

    #[test]
    fn test_parse_report_date_rejects_garbage() {
        assert_eq!(parse_report_date(""), None);
        assert_eq!(parse_report_date("March 2024"), None);
        assert_eq!(parse_report_date("2024-13-40"), None);
        assert_eq!(parse_report_date("07/03/2024"), None);
    }

    #[test]
    fn test_citation_label() {
        assert_eq!(
            citation_label("cbc.pdf", Some("2024-03-07T08:00:00Z")),
            "[cbc.pdf, 2024-03-07]"
        );
        assert_eq!(citation_label("cbc.pdf", None), "[cbc.pdf, undated]");
        assert_eq!(citation_label("cbc.pdf", Some("last spring")), "[cbc.pdf, undated]");
    }

    #[test]
    fn test_date_status_labels() {
        assert_eq!(DateStatus::from_label("exact"), DateStatus::Exact);
        assert_eq!(DateStatus::from_label("Inferred"), DateStatus::Inferred);
        assert_eq!(DateStatus::from_label("missing"), DateStatus::Missing);
        assert_eq!(DateStatus::from_label("guessed"), DateStatus::Unknown);
    }

    #[test]
    fn test_chunk_from_record() {
        let chunk = Chunk::from_record(scored(json!({
            "patientId": "p1",
            "documentId": "doc-1",
            "filename": "cbc.pdf",
            "reportDate": "2024-03-07",
            "dateStatus": "exact",
            "documentType": "lab"
        })));
        assert_eq!(chunk.document_id, "doc-1");
        assert_eq!(chunk.filename, "cbc.pdf");
        assert_eq!(chunk.date_status, DateStatus::Exact);
        assert_eq!(chunk.document_type.as_deref(), Some("lab"));
        assert_eq!(chunk.patient_id, "p1");
        assert_eq!(chunk.citation(), "[cbc.pdf, 2024-03-07]");
    }

    #[test]
    fn test_chunk_from_sparse_record() {
        let chunk = Chunk::from_record(scored(json!({ "patientId": "p1", "reportDate": "" })));
        assert_eq!(chunk.document_id, "doc-1");
        assert_eq!(chunk.filename, "doc-1");
        assert_eq!(chunk.report_date, None);
        assert_eq!(chunk.date_status, DateStatus::Unknown);
        assert_eq!(chunk.citation(), "[doc-1, undated]");
        assert_eq!(chunk.date_label(), "undated");
    }

    #[test]
    fn test_fact_render_and_citation() {
        let chunk = Chunk::from_record(scored(json!({
            "patientId": "p1",
            "filename": "cbc.pdf",
            "reportDate": "2024-03-07"
        })));
        let fact = StructuredFact {
            fact: "Hemoglobin".into(),
            value: Some("13.2".into()),
            unit: Some("g/dL".into()),
            date: Some("2024-03-07".into()),
            source: "cbc.pdf".into(),
        };
        assert_eq!(fact.render(), "Hemoglobin: 13.2 g/dL (2024-03-07)");
        assert_eq!(fact.citation(&[chunk]).as_deref(), Some("[cbc.pdf, 2024-03-07]"));
        assert_eq!(fact.citation(&[]), None);
    }
}
