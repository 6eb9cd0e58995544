//! Retrieve command handler.

use super::open_index;
use bookchat_core::{config::AppConfig, AppResult};
use bookchat_index::create_provider;
use clap::Args;

const SNIPPET_CHARS: usize = 120;

/// Find the chunks closest to a query
#[derive(Args, Debug)]
pub struct RetrieveCommand {
    /// Query text
    pub query: String,

    /// Restrict the search to these books (repeatable)
    #[arg(long = "book")]
    pub books: Vec<String>,

    /// Number of chunks to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(SNIPPET_CHARS) {
        Some((end, _)) => format!("{}...", &flat[..end]),
        None => flat,
    }
}

impl RetrieveCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing retrieve command");
        tracing::debug!("Retrieve options: {:?}", self);

        let (index_config, index) = open_index(config)?;
        let provider = create_provider(&index_config.embedding)?;
        let top_k = self.top_k.unwrap_or(index_config.default_top_k);
        let scope = (!self.books.is_empty()).then_some(self.books.as_slice());

        let results = index
            .retrieve_text(&self.query, provider.as_ref(), scope, top_k)
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&results)?);
            return Ok(());
        }

        if results.is_empty() {
            println!("No matching chunks");
            return Ok(());
        }

        for (rank, hit) in results.iter().enumerate() {
            let page = hit
                .chunk
                .page
                .map(|p| format!(", page {}", p))
                .unwrap_or_default();
            println!(
                "{}. [{:.4}] {} ({}{})",
                rank + 1,
                hit.distance,
                hit.chunk.chunk_id,
                hit.chunk.book_id,
                page
            );
            println!("   {}", snippet(&hit.chunk.text));
        }

        Ok(())
    }
}
