//! Stats command handler.
//!
//! Shows what the index holds.

use super::open_index;
use bookchat_core::{config::AppConfig, AppResult};
use clap::Args;

/// Show index statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let (_, index) = open_index(config)?;
        let stats = index.stats()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("Book index");
            println!("  Dimension: {}", stats.dimension);
            println!("  Books: {}", stats.total_books);
            println!("  Chunks: {}", stats.total_chunks);
            println!("  Vectors: {}", stats.total_vectors);
            if stats.dangling_rows > 0 {
                println!("  Retired rows: {}", stats.dangling_rows);
            }
            if let Some(last) = stats.last_ingested_at {
                println!("  Last ingestion: {}", last);
            }
        }

        Ok(())
    }
}
