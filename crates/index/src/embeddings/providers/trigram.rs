//! Offline embedding provider built from hashed character trigrams.

use crate::embeddings::provider::EmbeddingProvider;
use bookchat_core::{AppError, AppResult};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Deterministic, content-dependent embeddings without a model.
///
/// Each lowercased word contributes its padded character trigrams and the
/// whole word to hashed buckets, with a hashed sign so unrelated features
/// tend to cancel. The result is scaled to unit length. Texts sharing
/// vocabulary land close together under L2, which is enough for local use
/// and tests; it carries no semantics beyond spelling.
#[derive(Debug)]
pub struct TrigramProvider {
    dimensions: usize,
}

fn fnv1a(bytes: impl IntoIterator<Item = u8>) -> u64 {
    bytes.into_iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

impl TrigramProvider {
    pub fn new(dimensions: usize) -> AppResult<Self> {
        if dimensions == 0 {
            return Err(AppError::Embedding(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dimensions })
    }

    fn accumulate(&self, embedding: &mut [f32], feature: u64, weight: f32) {
        let bucket = (feature % self.dimensions as u64) as usize;
        let sign = if feature >> 63 == 0 { 1.0 } else { -1.0 };
        embedding[bucket] += sign * weight;
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            self.accumulate(&mut embedding, fnv1a(word.bytes()), 1.0);

            let padded: Vec<char> = std::iter::once('^')
                .chain(word.chars())
                .chain(std::iter::once('$'))
                .collect();
            for window in padded.windows(3) {
                let mut buf = [0u8; 12];
                let mut len = 0;
                for c in window {
                    len += c.encode_utf8(&mut buf[len..]).len();
                }
                self.accumulate(&mut embedding, fnv1a(buf[..len].iter().copied()), 0.5);
            }
        }

        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|v| *v /= norm);
        }
        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for TrigramProvider {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}
