//! Retrieval plans: the fixed catalogue of candidate pool sizes and evidence
//! budgets selected by question intent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-document cap for trend questions.
pub const TREND_PER_DOCUMENT_CAP: usize = 2;

/// Per-document cap for every other plan.
pub const DEFAULT_PER_DOCUMENT_CAP: usize = 3;

/// Identifier of a retrieval plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanId {
    Factual,
    Trend,
    Comparison,
    Explanation,
    Locate,
    Medication,
    Ambiguous,
}

impl PlanId {
    /// Every plan, in catalogue order.
    pub const ALL: [PlanId; 7] = [
        PlanId::Factual,
        PlanId::Trend,
        PlanId::Comparison,
        PlanId::Explanation,
        PlanId::Locate,
        PlanId::Medication,
        PlanId::Ambiguous,
    ];

    /// The identifier the classifier is asked to emit.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanId::Factual => "FACTUAL",
            PlanId::Trend => "TREND",
            PlanId::Comparison => "COMPARISON",
            PlanId::Explanation => "EXPLANATION",
            PlanId::Locate => "LOCATE",
            PlanId::Medication => "MEDICATION",
            PlanId::Ambiguous => "AMBIGUOUS",
        }
    }

    /// One-line meaning, used in the classifier prompt.
    pub fn description(&self) -> &'static str {
        match self {
            PlanId::Factual => "a single value, result or finding",
            PlanId::Trend => "how something changed over time",
            PlanId::Comparison => "comparing two or more results, dates or documents",
            PlanId::Explanation => "what a term, result or condition means",
            PlanId::Locate => "which document or visit contains something",
            PlanId::Medication => "medications, doses, prescriptions or allergies",
            PlanId::Ambiguous => "anything else, or unclear",
        }
    }

    /// The plan's constants.
    pub fn plan(&self) -> RetrievalPlan {
        RetrievalPlan::for_id(*self)
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanId {
    type Err = ();

    /// Exact match against the upper-case identifiers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlanId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or(())
    }
}

/// A named retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalPlan {
    pub id: PlanId,
    /// Nearest neighbours requested from the chunk index.
    pub k_candidates: usize,
    /// Chunks admitted into the final context.
    pub evidence_budget: usize,
    /// Chunks admitted from any single document.
    pub per_document_cap: usize,
}

impl RetrievalPlan {
    const fn new(id: PlanId, k_candidates: usize, evidence_budget: usize, cap: usize) -> Self {
        Self {
            id,
            k_candidates,
            evidence_budget,
            per_document_cap: cap,
        }
    }

    /// Look up the plan for an id.
    pub const fn for_id(id: PlanId) -> Self {
        match id {
            PlanId::Factual => Self::new(id, 25, 5, DEFAULT_PER_DOCUMENT_CAP),
            PlanId::Trend => Self::new(id, 40, 12, TREND_PER_DOCUMENT_CAP),
            PlanId::Comparison => Self::new(id, 30, 8, DEFAULT_PER_DOCUMENT_CAP),
            PlanId::Explanation => Self::new(id, 20, 6, DEFAULT_PER_DOCUMENT_CAP),
            PlanId::Locate => Self::new(id, 15, 4, DEFAULT_PER_DOCUMENT_CAP),
            PlanId::Medication => Self::new(id, 30, 8, DEFAULT_PER_DOCUMENT_CAP),
            PlanId::Ambiguous => Self::new(id, 40, 10, DEFAULT_PER_DOCUMENT_CAP),
        }
    }

    /// The widest-recall fallback.
    pub const fn ambiguous() -> Self {
        Self::for_id(PlanId::Ambiguous)
    }
}
