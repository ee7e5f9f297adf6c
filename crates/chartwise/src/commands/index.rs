//! Index command - load pre-chunked documents into the chunk index.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use console::Style;
use serde::Deserialize;
use tracing::info;

use chartwise_agent::types::meta;
use chartwise_index::{IndexRecord, VectorIndex};
use chartwise_llm::Embedder;

use super::Context;
use crate::wiring::{self, IndexKind};

/// Chunks embedded per embedding request.
const EMBED_BATCH: usize = 32;

/// Arguments for the index command.
#[derive(Args, Debug)]
pub struct IndexArgs {
    #[command(subcommand)]
    pub command: IndexCommand,
}

#[derive(Subcommand, Debug)]
pub enum IndexCommand {
    /// Embed and upsert chunks from a JSON Lines file
    Load {
        /// File with one chunk object per line
        file: PathBuf,

        /// Patient id for lines that carry none
        #[arg(short, long)]
        patient: Option<String>,
    },

    /// Show how many chunks are indexed
    Count,
}

/// Run the index command.
pub async fn run(args: IndexArgs, ctx: &Context) -> Result<()> {
    match args.command {
        IndexCommand::Load { file, patient } => cmd_load(ctx, &file, patient.as_deref()).await,
        IndexCommand::Count => cmd_count(ctx).await,
    }
}

/// One pre-chunked line of the input file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkLine {
    pub id: String,
    pub content: String,
    pub document_id: String,
    pub filename: String,
    #[serde(default)]
    pub report_date: Option<String>,
    #[serde(default)]
    pub date_status: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
}

impl ChunkLine {
    /// Turn into an index record. The document id is the record's source tag.
    pub fn into_record(self, embedding: Vec<f32>, patient_id: &str) -> IndexRecord {
        let mut record = IndexRecord::new(&self.id, &self.content, embedding, &self.document_id)
            .with_metadata(meta::PATIENT_ID, patient_id)
            .with_metadata(meta::DOCUMENT_ID, self.document_id.as_str())
            .with_metadata(meta::FILENAME, self.filename);
        if let Some(date) = self.report_date {
            record = record.with_metadata(meta::REPORT_DATE, date);
        }
        if let Some(status) = self.date_status {
            record = record.with_metadata(meta::DATE_STATUS, status);
        }
        if let Some(document_type) = self.document_type {
            record = record.with_metadata(meta::DOCUMENT_TYPE, document_type);
        }
        record
    }
}

/// Parse every non-blank line, resolving the patient id.
pub fn parse_lines(
    contents: &str,
    default_patient: Option<&str>,
) -> Result<Vec<(ChunkLine, String)>> {
    let mut chunks = Vec::new();
    for (n, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let chunk: ChunkLine =
            serde_json::from_str(line).with_context(|| format!("line {}: invalid chunk", n + 1))?;
        let patient = chunk
            .patient_id
            .clone()
            .or_else(|| default_patient.map(str::to_string))
            .with_context(|| format!("line {}: no patientId and no --patient given", n + 1))?;
        chunks.push((chunk, patient));
    }
    Ok(chunks)
}

async fn cmd_load(ctx: &Context, file: &Path, patient: Option<&str>) -> Result<()> {
    let contents = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let chunks = parse_lines(&contents, patient)?;

    let config = ctx.config();
    let embedder = wiring::build_embedder(&config.embedding())?;
    let index = wiring::open_index(config, IndexKind::Chunks)?;

    let mut loaded = 0;
    for batch in chunks.chunks(EMBED_BATCH) {
        let texts: Vec<&str> = batch.iter().map(|(c, _)| c.content.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;
        for ((chunk, patient), embedding) in batch.iter().zip(embeddings) {
            index
                .upsert(chunk.clone().into_record(embedding, patient))
                .await?;
            loaded += 1;
        }
    }

    info!(file = %file.display(), chunks = loaded, "Chunks loaded");
    if ctx.json_output {
        println!("{}", serde_json::json!({ "loaded": loaded }));
    } else {
        let green = Style::new().green();
        println!("{} {} chunks", green.apply_to("Loaded"), loaded);
    }
    Ok(())
}

async fn cmd_count(ctx: &Context) -> Result<()> {
    let index = wiring::open_index(ctx.config(), IndexKind::Chunks)?;
    let count = index.count().await?;
    if ctx.json_output {
        println!("{}", serde_json::json!({ "chunks": count }));
    } else {
        println!("{count} chunks indexed");
    }
    Ok(())
}
