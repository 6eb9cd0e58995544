//! Ingest command handler.
//!
//! Embeds a book's chunks and adds them to the index.

use super::open_index;
use bookchat_core::{config::AppConfig, AppResult};
use bookchat_index::{create_provider, ChunkCandidate};
use clap::Args;
use std::fs;
use std::path::PathBuf;

/// Add or replace a book in the index
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Book identifier
    pub book_id: String,

    /// JSON file with an array of {"text", "page"} chunks
    #[arg(long)]
    pub chunks: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command for book '{}'", self.book_id);

        let content = fs::read_to_string(&self.chunks)?;
        let candidates: Vec<ChunkCandidate> = serde_json::from_str(&content)?;
        tracing::debug!("Read {} chunks from {:?}", candidates.len(), self.chunks);

        let (index_config, index) = open_index(config)?;
        let provider = create_provider(&index_config.embedding)?;

        let report = index
            .ingest_book(
                &self.book_id,
                &candidates,
                provider.as_ref(),
                index_config.embedding.batch_size,
            )
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!(
                "Ingested book '{}': {} chunks starting at row {}",
                report.book_id,
                report.chunk_ids.len(),
                report.first_row
            );
            if report.replaced_chunks > 0 {
                println!("  Replaced {} chunks from a previous ingestion", report.replaced_chunks);
            }
        }

        Ok(())
    }
}
