//! Elasticsearch kNN client
//!
//! - POST `{url}/{index}/_search`
//! - Request: `{"knn": {"field", "query_vector", "k", "num_candidates"}, "_source": [...], "size": k}`
//! - Response: `{"hits": {"hits": [{"_id", "_score", "_source": {...}}, ...]}}`

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{IndexBackendType, KnnQuery, VectorIndex};
use crate::error::{Result, SearchError};
use crate::types::{CandidateHit, ProductFields};

/// Connection settings for an Elasticsearch index
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    /// Cluster URL (e.g., "https://my-deployment.es.io:443")
    pub url: String,
    /// API key sent as `Authorization: ApiKey <key>`
    pub api_key: Option<String>,
    pub index_name: String,
    /// Dense vector field holding description embeddings
    pub vector_field: String,
    pub dimension: usize,
    /// Transport timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            api_key: None,
            index_name: "all_products".to_string(),
            vector_field: "DescriptionVector".to_string(),
            dimension: 768,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    knn: KnnClause<'a>,
    #[serde(rename = "_source")]
    source: &'a [&'a str],
    size: usize,
}

#[derive(Debug, Serialize)]
struct KnnClause<'a> {
    field: &'a str,
    query_vector: &'a [f32],
    k: usize,
    num_candidates: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: Option<f32>,
    #[serde(rename = "_source", default)]
    source: ProductFields,
}

impl From<RawHit> for CandidateHit {
    fn from(raw: RawHit) -> Self {
        CandidateHit::new(raw.id, raw.score.unwrap_or(0.0), raw.source)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Structured {
        #[serde(rename = "type")]
        kind: String,
        reason: Option<String>,
    },
    Plain(String),
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorDetail::Structured {
                kind,
                reason: Some(reason),
            } => write!(f, "{}: {}", kind, reason),
            ErrorDetail::Structured { kind, reason: None } => write!(f, "{}", kind),
            ErrorDetail::Plain(message) => write!(f, "{}", message),
        }
    }
}

/// Elasticsearch index queried with top-level kNN search
pub struct ElasticsearchIndex {
    client: Client,
    config: ElasticsearchConfig,
}

impl ElasticsearchIndex {
    pub fn new(config: ElasticsearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SearchError::InvalidConfig(format!("HTTP client error: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ElasticsearchConfig {
        &self.config
    }

    fn search_url(&self) -> String {
        format!(
            "{}/{}/_search",
            self.config.url.trim_end_matches('/'),
            self.config.index_name
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.api_key {
            Some(ref key) => request.header("Authorization", format!("ApiKey {}", key)),
            None => request,
        }
    }
}

/// Map a failed send to the retryable index errors
fn transport_error(e: reqwest::Error) -> SearchError {
    if e.is_timeout() {
        SearchError::Timeout("Elasticsearch request".into())
    } else if e.is_connect() {
        SearchError::IndexUnreachable(format!("Connection failed: {}", e))
    } else {
        SearchError::IndexUnreachable(format!("Request failed: {}", e))
    }
}

async fn error_reason(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => format!("{} ({})", parsed.error, status),
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => format!("{} ({})", body, status),
    }
}

#[async_trait]
impl VectorIndex for ElasticsearchIndex {
    async fn query(&self, query: KnnQuery<'_>) -> Result<Vec<CandidateHit>> {
        query.validate(self.config.dimension)?;

        let body = SearchRequest {
            knn: KnnClause {
                field: &self.config.vector_field,
                query_vector: query.vector.as_slice(),
                k: query.k,
                num_candidates: query.num_candidates,
            },
            source: query.fields,
            size: query.k,
        };

        let response = self
            .authorize(self.client.post(self.search_url()).json(&body))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await.map_err(transport_error)?;
            let parsed: SearchResponse = serde_json::from_slice(&body)
                .map_err(|e| SearchError::MalformedResponse(e.to_string()))?;
            let hits: Vec<CandidateHit> = parsed.hits.hits.into_iter().map(Into::into).collect();
            debug!(
                index = %self.config.index_name,
                k = query.k,
                num_candidates = query.num_candidates,
                hits = hits.len(),
                "kNN query complete"
            );
            return Ok(hits);
        }

        let reason = error_reason(response).await;
        match status {
            StatusCode::BAD_REQUEST
            | StatusCode::NOT_FOUND
            | StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN => Err(SearchError::QueryRejected(reason)),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                Err(SearchError::Timeout(reason))
            }
            _ if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() => {
                Err(SearchError::IndexUnreachable(reason))
            }
            _ => Err(SearchError::QueryRejected(reason)),
        }
    }

    async fn ping(&self) -> Result<Duration> {
        let start = Instant::now();
        let url = format!("{}/", self.config.url.trim_end_matches('/'));
        let response = self
            .authorize(self.client.head(url))
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => Ok(start.elapsed()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SearchError::QueryRejected(
                "Elasticsearch rejected the configured credentials".into(),
            )),
            status => Err(SearchError::IndexUnreachable(format!(
                "Elasticsearch responded with {}",
                status
            ))),
        }
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn backend_type(&self) -> IndexBackendType {
        IndexBackendType::Elasticsearch
    }
}
