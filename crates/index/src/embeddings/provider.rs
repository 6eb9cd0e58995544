//! Embedding provider trait and factory.

use crate::embeddings::config::EmbeddingConfig;
use bookchat_core::{AppError, AppResult};
use std::sync::Arc;

/// Turns text into fixed-dimension vectors.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Provider name (e.g. "trigram")
    fn provider_name(&self) -> &str;

    /// Model identifier
    fn model_name(&self) -> &str;

    /// Length of every vector this provider returns
    fn dimensions(&self) -> usize;

    /// Embed several texts; the result has one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }
}

/// Create an embedding provider from configuration.
pub fn create_provider(config: &EmbeddingConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "trigram" => Ok(Arc::new(super::providers::trigram::TrigramProvider::new(
            config.dimensions,
        )?)),
        other => Err(AppError::Embedding(format!(
            "Unknown embedding provider: '{}'. Supported providers: trigram",
            other
        ))),
    }
}

/// Embed `texts` in slices of at most `batch_size`.
///
/// Fails if the provider returns a different number of vectors than it was
/// given texts, so a short batch can never shift chunks onto the wrong vector.
pub async fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> AppResult<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let mut embeddings = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size) {
        let vectors = provider.embed_batch(batch).await?;
        if vectors.len() != batch.len() {
            return Err(AppError::Embedding(format!(
                "Provider '{}' returned {} vectors for {} texts",
                provider.provider_name(),
                vectors.len(),
                batch.len()
            )));
        }
        embeddings.extend(vectors);
    }

    tracing::debug!(
        "Embedded {} texts with {} ({})",
        texts.len(),
        provider.provider_name(),
        provider.model_name()
    );
    Ok(embeddings)
}
