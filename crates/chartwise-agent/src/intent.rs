//! Intent classification: question text to retrieval plan.

use std::sync::Arc;

use chartwise_llm::{Message, ModelTier, ProviderRegistry};
use tracing::{debug, warn};

use crate::plan::{PlanId, RetrievalPlan};

/// Maps a question to one of the fixed retrieval plans.
///
/// Never fails: an erroring call or an unrecognised answer resolves to
/// [`PlanId::Ambiguous`].
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    models: Arc<ProviderRegistry>,
}

impl IntentClassifier {
    pub fn new(models: Arc<ProviderRegistry>) -> Self {
        Self { models }
    }

    /// Classify `question`. `patient_id` is only used for tracing.
    pub async fn classify(&self, question: &str, patient_id: &str) -> RetrievalPlan {
        let handle = match self.models.get(ModelTier::Fast) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(patient_id, error = %e, "No classifier model, using AMBIGUOUS");
                return RetrievalPlan::ambiguous();
            }
        };

        let request = handle
            .request(vec![Message::user(question)])
            .with_system(system_prompt())
            .with_temperature(0.0);

        let plan = match handle.complete(request).await {
            Ok(response) => match parse_plan_id(&response.text()) {
                Some(id) => id.plan(),
                None => {
                    warn!(
                        patient_id,
                        output = %response.text(),
                        "Unrecognised intent, using AMBIGUOUS"
                    );
                    RetrievalPlan::ambiguous()
                }
            },
            Err(e) => {
                warn!(patient_id, error = %e, "Intent classification failed, using AMBIGUOUS");
                RetrievalPlan::ambiguous()
            }
        };

        debug!(patient_id, plan = %plan.id, "Question classified");
        plan
    }
}

fn system_prompt() -> String {
    let mut prompt = String::from(
        "You route questions about a patient's medical record. \
         Classify the question into exactly one category:\n",
    );
    for id in PlanId::ALL {
        prompt.push_str(&format!("- {}: {}\n", id.as_str(), id.description()));
    }
    prompt.push_str(
        "Reply with the category identifier only: one word, upper case, \
         no punctuation, no explanation.",
    );
    prompt
}

/// Upper-case the reply, strip surrounding punctuation and match exactly.
pub fn parse_plan_id(output: &str) -> Option<PlanId> {
    let token = output
        .trim()
        .trim_matches(|c: char| !c.is_ascii_alphabetic())
        .to_ascii_uppercase();
    token.parse().ok()
}
