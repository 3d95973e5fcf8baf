use crate::error::ProviderError;
use crate::traits::EmbeddingProvider;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbeddingProvider {
    client: Client,
    endpoint: Url,
    dimensions: Option<usize>,
}

impl OpenAiEmbeddingProvider {
    pub fn new(
        api_key: &str,
        base_url: &str,
        dimensions: Option<usize>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| ProviderError::MissingApiKey)?;
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        let endpoint = Url::parse(&format!("{}/embeddings", base_url.trim_end_matches('/')))?;

        Ok(Self {
            client,
            endpoint,
            dimensions,
        })
    }

    async fn request(
        &self,
        input: &[&str],
        model: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbeddingRequest {
                model,
                input,
                dimensions: self.dimensions,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        decode(response.json().await?, input.len())
    }
}

/// Embeddings in input order. Providers may return items in any order.
fn decode(
    mut response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    if response.data.len() != expected {
        return Err(ProviderError::CountMismatch {
            expected,
            actual: response.data.len(),
        });
    }

    response.data.sort_by_key(|entry| entry.index);
    Ok(response.data.into_iter().map(|entry| entry.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed_one(&self, text: &str, model: &str) -> Result<Vec<f32>, ProviderError> {
        self.request(&[text], model)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("response carried no embedding".to_string()))
    }

    async fn embed_many(
        &self,
        texts: &[String],
        model: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let input = texts.iter().map(String::as_str).collect::<Vec<_>>();
        self.request(&input, model).await
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_api_key_is_rejected() {
        let result = OpenAiEmbeddingProvider::new(
            "  ",
            DEFAULT_OPENAI_BASE_URL,
            None,
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(ProviderError::MissingApiKey)));
    }

    #[test]
    fn endpoint_is_built_from_base_url() {
        let provider = OpenAiEmbeddingProvider::new(
            "sk-test",
            "http://localhost:8080/v1/",
            Some(3072),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(provider.endpoint.as_str(), "http://localhost:8080/v1/embeddings");
    }

    #[test]
    fn request_omits_unset_dimensions() {
        let body = serde_json::to_value(EmbeddingRequest {
            model: "text-embedding-3-large",
            input: &["pho"],
            dimensions: None,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"model": "text-embedding-3-large", "input": ["pho"]})
        );
    }

    fn response(body: &str) -> EmbeddingResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn out_of_order_items_come_back_in_input_order() {
        let body = r#"{"data": [
            {"index": 2, "embedding": [3.0]},
            {"index": 0, "embedding": [1.0]},
            {"index": 1, "embedding": [2.0]}
        ]}"#;
        let vectors = decode(response(body), 3).unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![3.0]]);
    }

    #[test]
    fn short_responses_are_rejected() {
        let body = r#"{"data": [{"index": 0, "embedding": [1.0]}]}"#;
        let result = decode(response(body), 2);
        assert!(matches!(
            result,
            Err(ProviderError::CountMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }
}
