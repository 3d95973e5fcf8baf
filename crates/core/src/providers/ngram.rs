use crate::chunking::normalize_whitespace;
use crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS;
use crate::error::ProviderError;
use crate::traits::EmbeddingProvider;
use async_trait::async_trait;

/// Offline provider hashing per-word character trigrams into buckets.
/// Deterministic, and close texts share most of their trigrams, so it is
/// usable for local runs and tests. The `model` argument is ignored.
#[derive(Debug, Clone, Copy)]
pub struct NgramEmbeddingProvider {
    pub dimensions: usize,
}

impl Default for NgramEmbeddingProvider {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl NgramEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Counts the padded trigrams of every word, then L2-normalizes. Words are
    /// padded with a space on each side so short words and word edges still
    /// produce features.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let normalized = normalize_whitespace(text).to_lowercase();

        for word in normalized.split(' ').filter(|word| !word.is_empty()) {
            let padded = format!(" {word} ").chars().collect::<Vec<_>>();
            for trigram in padded.windows(3) {
                let len = vector.len();
                vector[bucket(trigram, len)] += 1.0;
            }
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vector.iter_mut().for_each(|value| *value /= magnitude);
        }
        vector
    }
}

// FNV-1a over the trigram's UTF-8 bytes.
fn bucket(trigram: &[char], buckets: usize) -> usize {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;

    let token = trigram.iter().collect::<String>();
    let hash = token
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME));
    (hash % buckets as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for NgramEmbeddingProvider {
    fn name(&self) -> &str {
        "ngram"
    }

    async fn embed_one(&self, text: &str, _model: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed_text(text))
    }

    async fn embed_many(
        &self,
        texts: &[String],
        _model: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}
