//! Memory command - long-term memory maintenance.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;

use chartwise_agent::MemoryStore;

use super::Context;
use crate::wiring::{self, IndexKind};

/// Arguments for the memory command.
#[derive(Args, Debug)]
pub struct MemoryArgs {
    #[command(subcommand)]
    pub command: MemoryCommand,
}

#[derive(Subcommand, Debug)]
pub enum MemoryCommand {
    /// Delete every remembered exchange for one patient
    Forget {
        /// Patient whose memories are removed
        #[arg(short, long)]
        patient: String,
    },
}

/// Run the memory command.
pub async fn run(args: MemoryArgs, ctx: &Context) -> Result<()> {
    match args.command {
        MemoryCommand::Forget { patient } => cmd_forget(ctx, &patient).await,
    }
}

async fn cmd_forget(ctx: &Context, patient: &str) -> Result<()> {
    let config = ctx.config();
    let embedder = wiring::build_embedder(&config.embedding())?;
    let index = wiring::open_index(config, IndexKind::Memory)?;
    let store = MemoryStore::new(embedder, index);

    let removed = store.forget_patient(patient).await?;

    if ctx.json_output {
        println!(
            "{}",
            serde_json::json!({ "patientId": patient, "removed": removed })
        );
    } else {
        let dim = Style::new().dim();
        println!(
            "Removed {} memories {}",
            removed,
            dim.apply_to(format!("(patient {patient})"))
        );
    }
    Ok(())
}
