use crate::error::ProviderError;
use crate::traits::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 3_072;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub max_input_tokens: usize,
    /// Rough characters-per-token ratio used to turn the token budget into a
    /// character budget.
    pub chars_per_token: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-large".to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSIONS,
            batch_size: 100,
            batch_delay_ms: 100,
            max_input_tokens: 8_191,
            chars_per_token: 4,
        }
    }
}

impl EmbeddingConfig {
    pub fn max_input_chars(&self) -> usize {
        self.max_input_tokens.saturating_mul(self.chars_per_token)
    }
}

/// Cleans text, batches provider calls, and checks returned dimensions.
pub struct EmbeddingService {
    provider: Box<dyn EmbeddingProvider>,
    config: EmbeddingConfig,
}

impl EmbeddingService {
    pub fn new(provider: impl EmbeddingProvider + 'static, config: EmbeddingConfig) -> Self {
        Self {
            provider: Box::new(provider),
            config,
        }
    }

    /// Collapses whitespace runs and truncates to the provider's character
    /// budget.
    pub fn clean_text(&self, text: &str) -> String {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let max_chars = self.config.max_input_chars();
        let length = collapsed.chars().count();

        if length <= max_chars {
            return collapsed;
        }

        warn!(
            original_chars = length,
            truncated_chars = max_chars,
            "embedding input truncated"
        );
        collapsed.chars().take(max_chars).collect()
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let cleaned = self.clean_text(text);
        let embedding = self
            .provider
            .embed_one(&cleaned, &self.config.model)
            .await
            .map_err(|error| {
                warn!(provider = self.provider.name(), %error, "embedding request failed");
                error
            })?;

        self.check_dimension(&embedding);
        Ok(embedding)
    }

    /// Embeds `texts` in provider batches, one call at a time. The result is
    /// index-aligned with the input; any failed batch fails the whole call.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let batch_size = self.config.batch_size.max(1);
        let batch_count = texts.len().div_ceil(batch_size);
        let mut embeddings = Vec::with_capacity(texts.len());

        for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
            let cleaned = batch
                .iter()
                .map(|text| self.clean_text(text))
                .collect::<Vec<_>>();

            let vectors = self
                .provider
                .embed_many(&cleaned, &self.config.model)
                .await
                .map_err(|error| {
                    warn!(
                        provider = self.provider.name(),
                        batch = batch_index,
                        %error,
                        "batch embedding request failed"
                    );
                    error
                })?;

            if vectors.len() != batch.len() {
                return Err(ProviderError::CountMismatch {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }

            for vector in &vectors {
                self.check_dimension(vector);
            }
            embeddings.extend(vectors);
            debug!(batch = batch_index, batch_count, size = batch.len(), "embedded batch");

            if batch_index + 1 < batch_count && self.config.batch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }
        }

        Ok(embeddings)
    }

    pub fn similarity(&self, left: &[f32], right: &[f32]) -> f64 {
        cosine_similarity(left, right)
    }

    // Mismatches are reported, not corrected.
    fn check_dimension(&self, embedding: &[f32]) {
        if embedding.len() != self.config.dimension {
            warn!(
                expected = self.config.dimension,
                actual = embedding.len(),
                model = %self.config.model,
                "embedding dimension mismatch"
            );
        }
    }
}

/// A vector with no non-zero component has no direction to compare.
pub fn has_magnitude(vector: &[f32]) -> bool {
    vector.iter().any(|value| *value != 0.0)
}

/// Cosine similarity in [-1, 1]. Zero-magnitude or differently sized vectors
/// score 0.0.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }

    dot / (left_norm.sqrt() * right_norm.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Encodes each text as `[len, first byte]` and records every call.
    #[derive(Clone, Default)]
    struct RecordingProvider {
        calls: Arc<Mutex<Vec<Vec<String>>>>,
        fail_on_call: Option<usize>,
    }

    fn encode(text: &str) -> Vec<f32> {
        vec![
            text.chars().count() as f32,
            text.bytes().next().map(f32::from).unwrap_or(0.0),
        ]
    }

    #[async_trait]
    impl EmbeddingProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        async fn embed_one(&self, text: &str, _model: &str) -> Result<Vec<f32>, ProviderError> {
            self.calls.lock().unwrap().push(vec![text.to_string()]);
            Ok(encode(text))
        }

        async fn embed_many(
            &self,
            texts: &[String],
            _model: &str,
        ) -> Result<Vec<Vec<f32>>, ProviderError> {
            let mut calls = self.calls.lock().unwrap();
            if self.fail_on_call == Some(calls.len()) {
                return Err(ProviderError::Status {
                    status: 429,
                    body: "rate limited".to_string(),
                });
            }
            calls.push(texts.to_vec());
            Ok(texts.iter().map(|text| encode(text)).collect())
        }
    }

    fn config(batch_size: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            model: "test-model".to_string(),
            dimension: 2,
            batch_size,
            batch_delay_ms: 0,
            max_input_tokens: 5,
            chars_per_token: 2,
        }
    }

    #[test]
    fn similarity_of_identical_vectors_is_one() {
        let vector = [0.3f32, -1.2, 4.0];
        assert!((cosine_similarity(&vector, &vector) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_vectors_are_unrelated() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert!(!has_magnitude(&[0.0, -0.0]));
        assert!(!has_magnitude(&[]));
        assert!(has_magnitude(&[0.0, 1e-6]));
    }

    #[test]
    fn clean_text_collapses_and_truncates() {
        let service = EmbeddingService::new(RecordingProvider::default(), config(10));
        assert_eq!(service.clean_text("  pho \n\t bo "), "pho bo");
        assert_eq!(service.clean_text("abcdefghijklmnop"), "abcdefghij");
    }

    #[tokio::test]
    async fn batches_preserve_input_order() {
        let provider = RecordingProvider::default();
        let service = EmbeddingService::new(provider.clone(), config(2));
        let texts = vec![
            "a".to_string(),
            "bb".to_string(),
            "ccc".to_string(),
            "dddd".to_string(),
            "eeeee".to_string(),
        ];

        let vectors = service.embed_batch(&texts).await.unwrap();

        let expected: Vec<_> = texts.iter().map(|text| encode(text)).collect();
        assert_eq!(vectors, expected);
        assert_eq!(provider.calls.lock().unwrap().len(), 3);

        let mut reversed = texts.clone();
        reversed.reverse();
        let reversed_vectors = service.embed_batch(&reversed).await.unwrap();
        assert_eq!(reversed_vectors[0], expected[4]);
        assert_eq!(reversed_vectors[4], expected[0]);
    }

    #[tokio::test]
    async fn failed_batch_fails_the_call() {
        let provider = RecordingProvider {
            fail_on_call: Some(1),
            ..Default::default()
        };
        let service = EmbeddingService::new(provider, config(1));
        let texts = vec!["x".to_string(), "y".to_string()];

        let result = service.embed_batch(&texts).await;
        assert!(matches!(result, Err(ProviderError::Status { status: 429, .. })));
    }

    #[tokio::test]
    async fn dimension_mismatch_still_returns_vector() {
        let mut settings = config(4);
        settings.dimension = 8;
        let service = EmbeddingService::new(RecordingProvider::default(), settings);
        let vector = service.embed("hello").await.unwrap();
        assert_eq!(vector.len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_makes_no_calls() {
        let provider = RecordingProvider::default();
        let service = EmbeddingService::new(provider.clone(), config(4));
        assert!(service.embed_batch(&[]).await.unwrap().is_empty());
        assert!(provider.calls.lock().unwrap().is_empty());
    }
}
