//! ClinicalTrials.gov study search.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::error::{AgentError, Result};
use crate::tool::{ParamExt, ParameterValidationError, Tool, ToolContext, ToolResult};

const STUDIES_URL: &str = "https://clinicaltrials.gov/api/v2/studies";

/// Recruitment statuses the tool accepts.
pub const TRIAL_STATUSES: [&str; 4] = [
    "RECRUITING",
    "NOT_YET_RECRUITING",
    "ACTIVE_NOT_RECRUITING",
    "COMPLETED",
];

/// Locations listed per study before eliding the rest.
const MAX_LOCATIONS: usize = 3;

/// Searches the public ClinicalTrials.gov registry.
#[derive(Debug, Clone)]
pub struct ClinicalTrialsTool {
    client: Client,
    base_url: String,
    page_size: usize,
}

impl ClinicalTrialsTool {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: STUDIES_URL.to_string(),
            page_size: 5,
        })
    }

    /// Point at a different registry endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Query pairs for a search.
    pub fn query_params(
        &self,
        condition: &str,
        term: Option<&str>,
        status: Option<&str>,
    ) -> Vec<(&'static str, String)> {
        let mut query = vec![("query.cond", condition.to_string())];
        if let Some(term) = term {
            query.push(("query.term", term.to_string()));
        }
        if let Some(status) = status {
            query.push(("filter.overallStatus", status.to_string()));
        }
        query.push(("pageSize", self.page_size.to_string()));
        query.push(("format", "json".to_string()));
        query
    }
}

fn parse_status(raw: Option<&str>) -> Result<Option<&'static str>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let upper = raw.to_ascii_uppercase();
    TRIAL_STATUSES
        .iter()
        .find(|s| **s == upper)
        .map(|s| Some(*s))
        .ok_or_else(|| {
            ParameterValidationError::invalid_value(
                "status",
                raw,
                format!("expected one of {}", TRIAL_STATUSES.join(", ")),
            )
            .into()
        })
}

struct Labels {
    header: &'static str,
    none: &'static str,
    status: &'static str,
    conditions: &'static str,
    locations: &'static str,
}

fn labels(language: &str) -> Labels {
    let primary = language
        .split(['-', '_'])
        .next()
        .unwrap_or("en")
        .to_ascii_lowercase();
    match primary.as_str() {
        "es" => Labels {
            header: "Ensayos clínicos encontrados",
            none: "No se encontraron ensayos clínicos.",
            status: "Estado",
            conditions: "Condiciones",
            locations: "Ubicaciones",
        },
        "fr" => Labels {
            header: "Essais cliniques trouvés",
            none: "Aucun essai clinique trouvé.",
            status: "Statut",
            conditions: "Pathologies",
            locations: "Lieux",
        },
        "de" => Labels {
            header: "Gefundene klinische Studien",
            none: "Keine klinischen Studien gefunden.",
            status: "Status",
            conditions: "Erkrankungen",
            locations: "Standorte",
        },
        "pt" => Labels {
            header: "Ensaios clínicos encontrados",
            none: "Nenhum ensaio clínico encontrado.",
            status: "Situação",
            conditions: "Condições",
            locations: "Locais",
        },
        "it" => Labels {
            header: "Studi clinici trovati",
            none: "Nessuno studio clinico trovato.",
            status: "Stato",
            conditions: "Condizioni",
            locations: "Sedi",
        },
        _ => Labels {
            header: "Clinical trials found",
            none: "No clinical trials found.",
            status: "Status",
            conditions: "Conditions",
            locations: "Locations",
        },
    }
}

fn format_location(loc: &Value) -> Option<String> {
    let parts: Vec<&str> = ["facility", "city", "country"]
        .iter()
        .filter_map(|k| loc[*k].as_str())
        .filter(|s| !s.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

/// Render a `/studies` response as a localized listing.
pub fn format_studies(data: &Value, language: &str) -> String {
    let labels = labels(language);
    let studies = data["studies"].as_array().map(Vec::as_slice).unwrap_or(&[]);
    if studies.is_empty() {
        return labels.none.to_string();
    }

    let mut out = format!("{} ({}):\n", labels.header, studies.len());
    for study in studies {
        let section = &study["protocolSection"];
        let id = &section["identificationModule"];
        let nct = id["nctId"].as_str().unwrap_or("unknown");
        let title = id["briefTitle"].as_str().unwrap_or("(untitled)");

        out.push_str(&format!("\n- {} {}\n", nct, title));
        out.push_str(&format!("  https://clinicaltrials.gov/study/{}\n", nct));

        if let Some(status) = section["statusModule"]["overallStatus"].as_str() {
            out.push_str(&format!("  {}: {}\n", labels.status, status));
        }

        if let Some(conditions) = section["conditionsModule"]["conditions"].as_array() {
            let names: Vec<&str> = conditions.iter().filter_map(Value::as_str).collect();
            if !names.is_empty() {
                out.push_str(&format!("  {}: {}\n", labels.conditions, names.join(", ")));
            }
        }

        if let Some(locations) = section["contactsLocationsModule"]["locations"].as_array() {
            let mut shown: Vec<String> = locations
                .iter()
                .filter_map(format_location)
                .take(MAX_LOCATIONS)
                .collect();
            if locations.len() > MAX_LOCATIONS {
                shown.push(format!("+{}", locations.len() - MAX_LOCATIONS));
            }
            if !shown.is_empty() {
                out.push_str(&format!("  {}: {}\n", labels.locations, shown.join("; ")));
            }
        }
    }
    out
}

#[async_trait]
impl Tool for ClinicalTrialsTool {
    fn name(&self) -> &str {
        "clinical_trials"
    }

    fn description(&self) -> &str {
        "Search ClinicalTrials.gov for studies on a condition. Use when the user asks about \
         trials or studies they might join."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "condition": {
                    "type": "string",
                    "description": "Condition or disease, e.g. 'type 2 diabetes'"
                },
                "term": {
                    "type": "string",
                    "description": "Extra search terms, e.g. an intervention name"
                },
                "status": {
                    "type": "string",
                    "enum": TRIAL_STATUSES,
                    "description": "Recruitment status filter"
                }
            },
            "required": ["condition"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let condition = params.required_str("condition", "name the condition to search for")?;
        let term = params.optional_str("term");
        let status = parse_status(params.optional_str("status"))?;

        let response = self
            .client
            .get(&self.base_url)
            .query(&self.query_params(condition, term, status))
            .send()
            .await
            .map_err(|e| AgentError::Tool(format!("ClinicalTrials.gov request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AgentError::Tool(format!(
                "ClinicalTrials.gov error: {}",
                response.status()
            )));
        }

        let data: Value = response.json().await.map_err(|e| {
            AgentError::Tool(format!("Failed to parse ClinicalTrials.gov response: {}", e))
        })?;

        debug!(
            patient_id = %ctx.patient_id,
            turn_id = %ctx.turn_id,
            condition,
            studies = data["studies"].as_array().map_or(0, Vec::len),
            "Clinical trials search complete"
        );
        Ok(ToolResult::text(format_studies(&data, &ctx.language)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TurnId;

    fn sample() -> Value {
        json!({"studies": [{
            "protocolSection": {
                "identificationModule": {"nctId": "NCT01234567", "briefTitle": "Metformin in Prediabetes"},
                "statusModule": {"overallStatus": "RECRUITING"},
                "conditionsModule": {"conditions": ["Prediabetes", "Obesity"]},
                "contactsLocationsModule": {"locations": [
                    {"facility": "General Hospital", "city": "Boston", "country": "United States"},
                    {"city": "Madrid", "country": "Spain"},
                    {"city": "Lyon"},
                    {"city": "Porto"},
                    {"city": "Turin"}
                ]}
            }
        }]})
    }

    #[test]
    fn test_format_studies_english() {
        let text = format_studies(&sample(), "en");
        assert!(text.starts_with("Clinical trials found (1):"));
        assert!(text.contains("- NCT01234567 Metformin in Prediabetes"));
        assert!(text.contains("https://clinicaltrials.gov/study/NCT01234567"));
        assert!(text.contains("Status: RECRUITING"));
        assert!(text.contains("Conditions: Prediabetes, Obesity"));
        assert!(text.contains("General Hospital, Boston, United States; Madrid, Spain; Lyon; +2"));
    }

    #[test]
    fn test_format_studies_localized() {
        assert!(format_studies(&sample(), "es-MX").starts_with("Ensayos clínicos encontrados"));
        assert!(format_studies(&sample(), "de").contains("Standorte:"));
        assert_eq!(format_studies(&json!({"studies": []}), "fr"), "Aucun essai clinique trouvé.");
        assert_eq!(format_studies(&json!({}), "xx"), "No clinical trials found.");
    }

    #[test]
    fn test_query_params() {
        let tool = ClinicalTrialsTool::new().unwrap().with_page_size(10);
        let query = tool.query_params("asthma", Some("dupilumab"), Some("RECRUITING"));
        assert_eq!(
            query,
            vec![
                ("query.cond", "asthma".to_string()),
                ("query.term", "dupilumab".to_string()),
                ("filter.overallStatus", "RECRUITING".to_string()),
                ("pageSize", "10".to_string()),
                ("format", "json".to_string()),
            ]
        );
        assert_eq!(tool.query_params("asthma", None, None).len(), 3);
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status(None).unwrap(), None);
        assert_eq!(parse_status(Some("recruiting")).unwrap(), Some("RECRUITING"));
        assert!(matches!(parse_status(Some("SOON")), Err(AgentError::Tool(_))));
    }

    #[tokio::test]
    async fn test_execute_requires_condition() {
        let tool = ClinicalTrialsTool::new().unwrap();
        let ctx = ToolContext::new(TurnId::new(), "p1");
        let err = tool.execute(json!({"term": "x"}), &ctx).await.unwrap_err();
        assert!(err.to_string().contains("condition"));

        let err = tool
            .execute(json!({"condition": "asthma", "status": "SOON"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("status"));
    }
}
