//! OpenAI-compatible embedding provider
//!
//! Works with the OpenAI API, Azure OpenAI and Ollama.
//!
//! - POST `{base_url}/v1/embeddings`
//! - Request: `{"model": "...", "input": ["text1", "text2", ...]}`
//! - Response: `{"data": [{"embedding": [...], "index": 0}, ...], ...}`
//!
//! # Example
//!
//! ```ignore
//! use prodsearch_search::embeddings::{EmbeddingProvider, OpenAIConfig, OpenAIProvider};
//!
//! let provider = OpenAIProvider::new(OpenAIConfig::ollama())?;
//! let embeddings = provider.encode(vec!["cotton kurta for men".into()]).await?;
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[cfg(feature = "rate-limit")]
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
#[cfg(feature = "rate-limit")]
use std::num::NonZeroU32;
#[cfg(feature = "rate-limit")]
use std::sync::Arc;

use super::provider::{EmbeddingProvider, EmbeddingProviderType, ProviderStatus};
use crate::error::{Result, SearchError};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

const DEFAULT_MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 500;

#[cfg(feature = "rate-limit")]
const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;

#[cfg(feature = "rate-limit")]
type EmbeddingRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Configuration for OpenAI-compatible provider
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API (e.g., "https://api.openai.com/v1" or "http://localhost:11434/v1")
    pub base_url: String,
    /// API key (optional for local providers like Ollama)
    pub api_key: Option<String>,
    /// Embedding model (e.g., "text-embedding-3-small", "nomic-embed-text")
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Use Azure OpenAI header format (api-key instead of Bearer)
    pub azure_mode: bool,
    /// Requests per second limit
    #[cfg(feature = "rate-limit")]
    pub requests_per_second: u32,
}

impl OpenAIConfig {
    /// Config for a local Ollama endpoint
    pub fn ollama() -> Self {
        Self::with_endpoint("http://localhost:11434/v1", None, "nomic-embed-text")
    }

    /// Config for the OpenAI API
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(
            "https://api.openai.com/v1",
            Some(api_key.into()),
            "text-embedding-3-small",
        )
    }

    /// Config for an arbitrary endpoint with default timeout and retries
    pub fn with_endpoint(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            azure_mode: false,
            #[cfg(feature = "rate-limit")]
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_azure_mode(mut self, azure_mode: bool) -> Self {
        self.azure_mode = azure_mode;
        self
    }

    #[cfg(feature = "rate-limit")]
    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

/// OpenAI-compatible embedding provider
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
    /// Dimension observed on the first successful response
    dimension: AtomicUsize,
    #[cfg(feature = "rate-limit")]
    rate_limiter: Arc<EmbeddingRateLimiter>,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SearchError::InvalidConfig(format!("HTTP client error: {}", e)))?;

        #[cfg(feature = "rate-limit")]
        let rate_limiter = {
            let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
            Arc::new(RateLimiter::direct(Quota::per_second(rps)))
        };

        Ok(Self {
            client,
            config,
            dimension: AtomicUsize::new(0),
            #[cfg(feature = "rate-limit")]
            rate_limiter,
        })
    }

    #[cfg(feature = "rate-limit")]
    async fn wait_for_permit(&self) {
        self.rate_limiter.until_ready().await;
    }

    #[cfg(not(feature = "rate-limit"))]
    async fn wait_for_permit(&self) {}

    fn embeddings_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/embeddings", base)
        } else {
            format!("{}/v1/embeddings", base)
        }
    }

    fn build_request(&self, texts: Vec<String>) -> RequestBuilder {
        let request = self.client.post(self.embeddings_url()).json(&EmbeddingsRequest {
            model: &self.config.model,
            input: texts,
        });

        match (&self.config.api_key, self.config.azure_mode) {
            (Some(key), true) => request.header("api-key", key),
            (Some(key), false) => request.bearer_auth(key),
            (None, _) => request,
        }
    }

    async fn request_with_retry(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut retry_delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 0;

        loop {
            self.wait_for_permit().await;

            match self.send_request(texts.clone()).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e @ (SearchError::ProviderAuth(_) | SearchError::InvalidModel(_))) => {
                    return Err(e)
                }
                Err(e) if attempt >= self.config.max_retries => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "Embedding request failed, retrying");
                    tokio::time::sleep(retry_delay).await;
                    retry_delay *= 2;
                    attempt += 1;
                }
            }
        }
    }

    async fn send_request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = texts.len();
        let response = self
            .build_request(texts)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let mut body: EmbeddingsResponse = response.json().await.map_err(|e| {
                    SearchError::Embedding(format!("Invalid embeddings response: {}", e))
                })?;
                if body.data.len() != expected {
                    return Err(SearchError::Embedding(format!(
                        "Expected {} embeddings, got {}",
                        expected,
                        body.data.len()
                    )));
                }
                body.data.sort_by_key(|d| d.index);
                let embeddings: Vec<Vec<f32>> =
                    body.data.into_iter().map(|d| d.embedding).collect();

                if let Some(first) = embeddings.first() {
                    self.record_dimension(first.len())?;
                }
                Ok(embeddings)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::ProviderAuth(body))
            }
            StatusCode::NOT_FOUND => Err(SearchError::InvalidModel(self.config.model.clone())),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok());
                Err(SearchError::ProviderRateLimit { retry_after })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::Embedding(format!(
                    "Request failed with status {}: {}",
                    status, body
                )))
            }
        }
    }

    fn record_dimension(&self, dim: usize) -> Result<()> {
        match self
            .dimension
            .compare_exchange(0, dim, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => {
                debug!("Detected embedding dimension {} for {}", dim, self.config.model);
                Ok(())
            }
            Err(cached) if cached == dim => Ok(()),
            Err(cached) => Err(SearchError::DimensionMismatch {
                expected: cached,
                actual: dim,
            }),
        }
    }

    async fn health_check(&self) -> Result<Duration> {
        let start = Instant::now();
        let response = self
            .build_request(vec!["health check".into()])
            .send()
            .await
            .map_err(transport_error)?;
        let latency = start.elapsed();

        match response.status() {
            // A rate-limited endpoint is still reachable
            StatusCode::OK | StatusCode::TOO_MANY_REQUESTS => Ok(latency),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(SearchError::ProviderAuth("Invalid API key".into()))
            }
            StatusCode::NOT_FOUND => Err(SearchError::InvalidModel(self.config.model.clone())),
            status => Err(SearchError::Embedding(format!(
                "Health check failed with status {}",
                status
            ))),
        }
    }
}

fn transport_error(e: reqwest::Error) -> SearchError {
    if e.is_timeout() {
        SearchError::Timeout("embedding request".into())
    } else if e.is_connect() {
        SearchError::ModelUnavailable(format!("Connection failed: {}", e))
    } else {
        SearchError::Embedding(format!("Request failed: {}", e))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.request_with_retry(texts).await
    }

    async fn check_status(&self) -> Result<ProviderStatus> {
        match self.health_check().await {
            Ok(latency) => Ok(ProviderStatus::healthy(EmbeddingProviderType::Openai, "Remote")
                .with_latency(latency.as_millis() as u64)),
            Err(e) => Ok(ProviderStatus::unavailable(
                EmbeddingProviderType::Openai,
                e.to_string(),
            )),
        }
    }

    async fn warmup(&self) -> Result<()> {
        self.health_check().await.map(|_| ())
    }

    fn embedding_dim(&self) -> usize {
        match self.dimension.load(Ordering::Relaxed) {
            0 => match self.config.model.as_str() {
                "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
                "text-embedding-3-large" => 3072,
                _ => 768,
            },
            dim => dim,
        }
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Openai
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

impl std::fmt::Debug for OpenAIProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIProvider")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("timeout_secs", &self.config.timeout_secs)
            .field("azure_mode", &self.config.azure_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mock_response(dim: usize, count: usize) -> serde_json::Value {
        let data: Vec<serde_json::Value> = (0..count)
            .map(|i| json!({ "object": "embedding", "embedding": vec![0.1_f32; dim], "index": i }))
            .collect();
        json!({ "object": "list", "data": data, "model": "test-model" })
    }

    fn test_config(server: &MockServer) -> OpenAIConfig {
        OpenAIConfig::with_endpoint(server.uri(), Some("test-key".into()), "test-model")
            .with_timeout(5)
            .with_max_retries(0)
    }

    #[tokio::test]
    async fn test_encode_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_json(json!({ "model": "test-model", "input": ["red saree"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(768, 1)))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new(test_config(&server)).unwrap();
        let embeddings = provider.encode(vec!["red saree".into()]).await.unwrap();

        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].len(), 768);
    }

    #[tokio::test]
    async fn test_reorders_by_index() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "embedding": [2.0, 2.0], "index": 1 },
                    { "embedding": [1.0, 1.0], "index": 0 }
                ]
            })))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new(test_config(&server)).unwrap();
        let embeddings = provider
            .encode(vec!["a".into(), "b".into()])
            .await
            .unwrap();

        assert_eq!(embeddings, vec![vec![1.0, 1.0], vec![2.0, 2.0]]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let server = MockServer::start().await;
        let provider = OpenAIProvider::new(test_config(&server)).unwrap();

        assert!(provider.encode(vec![]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auth_failure_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new(test_config(&server).with_max_retries(2)).unwrap();
        let result = provider.encode(vec!["test".into()]).await;

        assert!(matches!(result, Err(SearchError::ProviderAuth(_))));
    }

    #[tokio::test]
    async fn test_model_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new(test_config(&server)).unwrap();
        let result = provider.encode(vec!["test".into()]).await;

        assert!(matches!(result, Err(SearchError::InvalidModel(m)) if m == "test-model"));
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "60"))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new(test_config(&server)).unwrap();
        let result = provider.encode(vec!["test".into()]).await;

        assert!(matches!(
            result,
            Err(SearchError::ProviderRateLimit {
                retry_after: Some(60)
            })
        ));
    }

    #[tokio::test]
    async fn test_server_error_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new(test_config(&server).with_max_retries(1)).unwrap();
        let result = provider.encode(vec!["test".into()]).await;

        assert!(matches!(result, Err(SearchError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_azure_mode_header() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("api-key", "azure-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(1536, 1)))
            .mount(&server)
            .await;

        let config = OpenAIConfig::with_endpoint(
            server.uri(),
            Some("azure-key".into()),
            "text-embedding-ada-002",
        )
        .with_azure_mode(true);

        let provider = OpenAIProvider::new(config).unwrap();
        assert!(provider.encode(vec!["test".into()]).await.is_ok());
    }

    #[tokio::test]
    async fn test_dimension_detection() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(1024, 1)))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new(test_config(&server)).unwrap();
        assert_eq!(provider.embedding_dim(), 768);

        provider.encode(vec!["test".into()]).await.unwrap();
        assert_eq!(provider.embedding_dim(), 1024);
    }

    #[tokio::test]
    async fn test_check_status_healthy() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(768, 1)))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new(test_config(&server)).unwrap();
        let status = provider.check_status().await.unwrap();

        assert!(status.is_ready());
        assert!(status.latency_ms.is_some());
    }

    #[tokio::test]
    async fn test_check_status_unreachable() {
        let config = OpenAIConfig::with_endpoint("http://127.0.0.1:1", None, "test-model")
            .with_timeout(2);
        let provider = OpenAIProvider::new(config).unwrap();

        let status = provider.check_status().await.unwrap();
        assert!(!status.available);
        assert!(status.error.is_some());
    }

    #[test]
    fn test_config_presets() {
        let config = OpenAIConfig::ollama();
        assert_eq!(config.base_url, "http://localhost:11434/v1");
        assert!(config.api_key.is_none());
        assert_eq!(config.model, "nomic-embed-text");

        let config = OpenAIConfig::openai("sk-test");
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, "text-embedding-3-small");
    }

    #[cfg(feature = "rate-limit")]
    #[tokio::test]
    async fn test_rate_limiter_throttles_requests() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response(768, 1)))
            .expect(4)
            .mount(&server)
            .await;

        // Burst of 2, then one request every 500ms
        let provider =
            OpenAIProvider::new(test_config(&server).with_requests_per_second(2)).unwrap();

        let start = Instant::now();
        for _ in 0..4 {
            provider.encode(vec!["test".into()]).await.unwrap();
        }

        assert!(start.elapsed() >= Duration::from_millis(900));
    }
}
