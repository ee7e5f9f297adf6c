//! Recency-first, source-diverse evidence selection.

use std::collections::HashMap;

use tracing::debug;

use crate::plan::RetrievalPlan;
use crate::types::Chunk;

/// Select the evidence subset for `plan` from `candidates`.
///
/// Candidates are stably sorted by report date, newest first, with undated
/// or unparseable dates last. The walk then admits a chunk only while its
/// document is under the plan's per-document cap, and stops at the evidence
/// budget. Pure and deterministic.
pub fn rerank(candidates: Vec<Chunk>, plan: &RetrievalPlan) -> Vec<Chunk> {
    let total = candidates.len();

    let mut dated: Vec<_> = candidates.into_iter().map(|c| (c.date(), c)).collect();
    // Option orders None below Some, so a descending sort puts undated last.
    dated.sort_by(|(a, _), (b, _)| b.cmp(a));

    let mut per_document: HashMap<String, usize> = HashMap::new();
    let mut selected = Vec::with_capacity(plan.evidence_budget.min(total));

    for (_, chunk) in dated {
        if selected.len() >= plan.evidence_budget {
            break;
        }
        let count = per_document.entry(chunk.document_id.clone()).or_insert(0);
        if *count >= plan.per_document_cap {
            continue;
        }
        *count += 1;
        selected.push(chunk);
    }

    debug!(
        plan = %plan.id,
        candidates = total,
        selected = selected.len(),
        documents = per_document.len(),
        "Evidence reranked"
    );
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanId;
    use crate::types::DateStatus;

    fn chunk(id: &str, document: &str, date: Option<&str>) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: format!("content of {id}"),
            document_id: document.to_string(),
            filename: format!("{document}.pdf"),
            report_date: date.map(str::to_string),
            date_status: DateStatus::Exact,
            document_type: None,
            patient_id: "p1".to_string(),
            similarity: 0.5,
        }
    }

    fn ids(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(rerank(Vec::new(), &PlanId::Factual.plan()).is_empty());
    }

    #[test]
    fn test_newest_first_undated_last() {
        let candidates = vec![
            chunk("old", "a", Some("2020-01-01")),
            chunk("none", "b", None),
            chunk("new", "c", Some("2024-06-01T09:00:00Z")),
            chunk("garbage", "d", Some("sometime")),
            chunk("mid", "e", Some("2022/05/05")),
        ];
        let selected = rerank(candidates, &PlanId::Ambiguous.plan());
        assert_eq!(ids(&selected), vec!["new", "mid", "old", "none", "garbage"]);
    }

    #[test]
    fn test_single_document_capped() {
        let candidates: Vec<_> = (0..10)
            .map(|i| chunk(&format!("c{i}"), "only", Some("2024-01-01")))
            .collect();
        let plan = PlanId::Factual.plan();
        assert_eq!(plan.evidence_budget, 5);

        let selected = rerank(candidates, &plan);
        assert_eq!(selected.len(), 3);
        // Stable: equal dates keep input order.
        assert_eq!(ids(&selected), vec!["c0", "c1", "c2"]);
    }

    #[test]
    fn test_trend_cap_is_two() {
        let candidates: Vec<_> = (0..6)
            .map(|i| chunk(&format!("c{i}"), "only", Some("2024-01-01")))
            .collect();
        assert_eq!(rerank(candidates, &PlanId::Trend.plan()).len(), 2);
    }

    #[test]
    fn test_budget_bounds_output() {
        let candidates: Vec<_> = (0..30)
            .map(|i| {
                chunk(
                    &format!("c{i}"),
                    &format!("doc{}", i % 10),
                    Some(format!("2024-01-{:02}", i % 28 + 1).as_str()),
                )
            })
            .collect();
        for id in PlanId::ALL {
            let plan = id.plan();
            let selected = rerank(candidates.clone(), &plan);
            assert!(selected.len() <= plan.evidence_budget.min(candidates.len()));

            let mut counts: HashMap<&str, usize> = HashMap::new();
            for c in &selected {
                *counts.entry(c.document_id.as_str()).or_default() += 1;
            }
            assert!(counts.values().all(|&n| n <= plan.per_document_cap));
        }
    }

    #[test]
    fn test_capped_document_does_not_starve_others() {
        let mut candidates: Vec<_> = (0..5)
            .map(|i| chunk(&format!("a{i}"), "a", Some("2024-05-01")))
            .collect();
        candidates.push(chunk("b0", "b", Some("2023-01-01")));
        candidates.push(chunk("c0", "c", None));

        let selected = rerank(candidates, &PlanId::Factual.plan());
        assert_eq!(ids(&selected), vec!["a0", "a1", "a2", "b0", "c0"]);
    }

    #[test]
    fn test_deterministic() {
        let candidates: Vec<_> = (0..12)
            .map(|i| chunk(&format!("c{i}"), &format!("d{}", i % 3), Some("2024-02-02")))
            .collect();
        let plan = PlanId::Comparison.plan();
        let first = rerank(candidates.clone(), &plan);
        let second = rerank(candidates, &plan);
        assert_eq!(first, second);
    }
}
