//! Qdrant kNN client
//!
//! Maps the kNN query onto `search_points`: `k` becomes the result limit and
//! `num_candidates` the HNSW `ef` beam width. Product fields are read from
//! the point payload.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, PayloadIncludeSelector, ScoredPoint, SearchParamsBuilder,
    SearchPoints, SearchPointsBuilder,
};
use qdrant_client::{Qdrant, QdrantError};
use tracing::{debug, info};

use super::{IndexBackendType, KnnQuery, VectorIndex};
use crate::error::{Result, SearchError};
use crate::types::{CandidateHit, ProductFields};

/// gRPC status codes that indicate a malformed request
const GRPC_INVALID_ARGUMENT: i32 = 3;
const GRPC_DEADLINE_EXCEEDED: i32 = 4;
const GRPC_NOT_FOUND: i32 = 5;
const GRPC_PERMISSION_DENIED: i32 = 7;
const GRPC_FAILED_PRECONDITION: i32 = 9;
const GRPC_UNAUTHENTICATED: i32 = 16;

/// Connection settings for a Qdrant collection
#[derive(Debug, Clone)]
pub struct QdrantIndexConfig {
    /// gRPC URL (e.g., "http://localhost:6334")
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub dimension: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for QdrantIndexConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection: "all_products".to_string(),
            dimension: 768,
            timeout_secs: 10,
        }
    }
}

/// Qdrant collection queried with `search_points`
pub struct QdrantIndex {
    client: Qdrant,
    config: QdrantIndexConfig,
}

impl QdrantIndex {
    pub fn new(config: QdrantIndexConfig) -> Result<Self> {
        info!("Configuring Qdrant client for {}", config.url);

        let mut builder =
            Qdrant::from_url(&config.url).timeout(Duration::from_secs(config.timeout_secs));
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder.build().map_err(|e| {
            SearchError::InvalidConfig(format!("Failed to build Qdrant client: {}", e))
        })?;

        Ok(Self { client, config })
    }

    /// Build the `search_points` request for a kNN query
    fn search_request(&self, query: &KnnQuery<'_>) -> SearchPoints {
        let include = PayloadIncludeSelector {
            fields: query.fields.iter().map(|f| f.to_string()).collect(),
        };

        SearchPointsBuilder::new(
            self.config.collection.as_str(),
            query.vector.as_slice().to_vec(),
            query.k as u64,
        )
        .with_payload(include)
        .params(SearchParamsBuilder::default().hnsw_ef(query.num_candidates as u64))
        .build()
    }
}

/// Classify a Qdrant failure by its gRPC status
fn classify(err: QdrantError) -> SearchError {
    match err {
        QdrantError::ResponseError { status } => {
            let message = status.message().to_string();
            match status.code() as i32 {
                GRPC_INVALID_ARGUMENT
                | GRPC_NOT_FOUND
                | GRPC_PERMISSION_DENIED
                | GRPC_FAILED_PRECONDITION
                | GRPC_UNAUTHENTICATED => SearchError::QueryRejected(message),
                GRPC_DEADLINE_EXCEEDED => SearchError::Timeout(message),
                _ => SearchError::IndexUnreachable(message),
            }
        }
        other => SearchError::IndexUnreachable(other.to_string()),
    }
}

fn payload_json(value: &qdrant_client::qdrant::Value) -> serde_json::Value {
    match &value.kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(*i),
        Some(Kind::DoubleValue(d)) => serde_json::Value::from(*d),
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        _ => serde_json::Value::Null,
    }
}

/// Points without an id are keyed by their rank so they never share a dedup key
fn to_hit(position: usize, point: ScoredPoint) -> Result<CandidateHit> {
    let id = match point.id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Num(n)) => n.to_string(),
        Some(PointIdOptions::Uuid(u)) => u,
        None => format!("#{}", position),
    };

    let source: serde_json::Map<String, serde_json::Value> = point
        .payload
        .iter()
        .map(|(key, value)| (key.clone(), payload_json(value)))
        .collect();
    let fields: ProductFields = serde_json::from_value(serde_json::Value::Object(source))?;

    Ok(CandidateHit::new(id, point.score, fields))
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn query(&self, query: KnnQuery<'_>) -> Result<Vec<CandidateHit>> {
        query.validate(self.config.dimension)?;

        let response = self
            .client
            .search_points(self.search_request(&query))
            .await
            .map_err(classify)?;

        let hits = response
            .result
            .into_iter()
            .enumerate()
            .map(|(position, point)| to_hit(position, point))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            collection = %self.config.collection,
            k = query.k,
            ef = query.num_candidates,
            hits = hits.len(),
            "Qdrant search complete"
        );
        Ok(hits)
    }

    async fn ping(&self) -> Result<Duration> {
        let start = Instant::now();
        self.client.health_check().await.map_err(classify)?;
        Ok(start.elapsed())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn backend_type(&self) -> IndexBackendType {
        IndexBackendType::Qdrant
    }
}
