//! Ask command - one question about one patient.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::Style;
use serde_json::Value;

use chartwise_agent::{
    BroadcastStatusChannel, QualityMode, StatusEvent, StatusKind, TurnRequest, TurnRunner,
};

use super::Context;
use crate::wiring;

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question to ask
    #[arg(required = true)]
    pub question: Vec<String>,

    /// Patient whose record is searched
    #[arg(short, long, env = "CHARTWISE_PATIENT")]
    pub patient: String,

    /// User the answer is delivered to
    #[arg(short, long, default_value = "cli")]
    pub user: String,

    /// Preferred answer language (en, es, fr, de, pt, it)
    #[arg(short, long)]
    pub language: Option<String>,

    /// Document id whose summary is attached to the turn (repeatable)
    #[arg(long = "attach")]
    pub attachments: Vec<String>,

    /// Use the advanced model tier for fact extraction
    #[arg(long)]
    pub advanced: bool,

    /// Seconds to wait for the turn to finish
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,
}

/// Run the ask command.
pub async fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let dim = Style::new().dim();
    let question = args.question.join(" ");

    let status = Arc::new(BroadcastStatusChannel::default());
    let mut events = status.subscribe(&args.user);
    let graph = wiring::build_graph(ctx.config(), status.clone())?;
    let runner = TurnRunner::new(Arc::new(graph), status);

    let mut request = TurnRequest::new(&args.user, &args.patient, question);
    if let Some(language) = &args.language {
        request = request.with_language(language);
    }
    for document_id in &args.attachments {
        request = request.with_attachment(document_id);
    }
    if args.advanced {
        request = request.with_quality(QualityMode::Advanced);
    }

    let ticket = runner.submit(request);
    if ctx.verbose {
        eprintln!(
            "{}",
            dim.apply_to(format!("Turn {} for patient {}", ticket.turn_id, args.patient))
        );
    }

    let deadline = Duration::from_secs(args.timeout);
    let failure = tokio::time::timeout(deadline, async {
        while let Some(event) = events.recv().await {
            if event.turn_id != ticket.turn_id {
                continue;
            }
            print_event(&event, ctx.json_output)?;
            if event.status.is_terminal() {
                return Ok(event.payload_str("message").map(str::to_string));
            }
        }
        Ok::<_, anyhow::Error>(None)
    })
    .await
    .map_err(|_| anyhow::anyhow!("no answer within {}s", args.timeout))??;

    if let Some(message) = failure {
        anyhow::bail!(message);
    }

    // Let trailing memory writes finish before the process exits.
    if let Some(outcome) = ticket.handle.await?
        && let Some(trailing) = outcome.trailing
    {
        trailing.await?;
    }
    Ok(())
}

fn print_event(event: &StatusEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    let line = render(event);
    match event.status {
        StatusKind::Answer | StatusKind::Suggestions => println!("{line}"),
        StatusKind::Error => eprintln!("{} {}", Style::new().red().apply_to("Error:"), line),
        _ => eprintln!("{}", Style::new().dim().apply_to(line)),
    }
    Ok(())
}

/// Plain-text rendering of one status event.
fn render(event: &StatusEvent) -> String {
    match event.status {
        StatusKind::GeneratingResponse => "[Generating response]".to_string(),
        StatusKind::Action => {
            let name = event
                .payload
                .get("action")
                .and_then(|a| a.get("name"))
                .and_then(Value::as_str)
                .unwrap_or("tool");
            format!("[Running: {name}]")
        }
        StatusKind::Answer => event.payload_str("answer").unwrap_or_default().to_string(),
        StatusKind::SuggestionsPending => "[Preparing suggestions]".to_string(),
        StatusKind::Suggestions => {
            let suggestions: Vec<&str> = event
                .payload
                .get("suggestions")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            if suggestions.is_empty() {
                String::new()
            } else {
                let mut out = String::from("\nYou could also ask:");
                for suggestion in suggestions {
                    out.push_str("\n  - ");
                    out.push_str(suggestion);
                }
                out
            }
        }
        StatusKind::Error => event.payload_str("message").unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartwise_agent::TurnId;
    use serde_json::json;

    #[test]
    fn test_render_action() {
        let event = StatusEvent::action("p1", TurnId::new(), "clinical_trials", &json!({}));
        assert_eq!(render(&event), "[Running: clinical_trials]");
    }

    #[test]
    fn test_render_answer() {
        let event = StatusEvent::answer("p1", TurnId::new(), "LDL was 130 mg/dL.");
        assert_eq!(render(&event), "LDL was 130 mg/dL.");
    }

    #[test]
    fn test_render_suggestions() {
        let suggestions = vec!["Is that high?".to_string(), "What changed?".to_string()];
        let event = StatusEvent::suggestions("p1", TurnId::new(), &suggestions);
        assert_eq!(
            render(&event),
            "\nYou could also ask:\n  - Is that high?\n  - What changed?"
        );

        let empty = StatusEvent::suggestions("p1", TurnId::new(), &[]);
        assert_eq!(render(&empty), "");
    }

    #[test]
    fn test_render_error() {
        let event = StatusEvent::error("p1", TurnId::new(), "Something went wrong");
        assert_eq!(render(&event), "Something went wrong");
    }
}
