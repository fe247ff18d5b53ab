//! In-process fakes for driving the search pipeline without a model or index.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use prodsearch_search::{
    CandidateHit, EmbeddingProvider, EmbeddingProviderType, IndexBackendType, KnnQuery,
    ProductFields, ProductSearcher, ProviderStatus, Result, SearchError, SearchOptions,
    VectorIndex,
};

pub const DIM: usize = 8;

/// Deterministic provider: each vector is derived from the text bytes
pub struct HashProvider {
    pub dim: usize,
    pub calls: AtomicUsize,
    pub failure: Option<fn() -> SearchError>,
    pub delay: Option<Duration>,
}

impl HashProvider {
    pub fn new() -> Self {
        Self {
            dim: DIM,
            calls: AtomicUsize::new(0),
            failure: None,
            delay: None,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = self.failure {
            return Err(failure());
        }
        Ok(texts
            .iter()
            .map(|text| {
                (0..self.dim)
                    .map(|i| {
                        text.bytes()
                            .enumerate()
                            .map(|(j, b)| (b as f32) * ((i + j + 1) as f32))
                            .sum::<f32>()
                    })
                    .collect()
            })
            .collect())
    }

    async fn check_status(&self) -> Result<ProviderStatus> {
        Ok(ProviderStatus::healthy(EmbeddingProviderType::Local, "CPU"))
    }

    async fn warmup(&self) -> Result<()> {
        Ok(())
    }

    fn embedding_dim(&self) -> usize {
        self.dim
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Local
    }

    fn model_id(&self) -> &str {
        "hash-test"
    }
}

/// One scripted outcome of an index query
pub enum Step {
    Hits(Vec<CandidateHit>),
    Fail(SearchError),
    Hang,
}

/// Index that replays scripted outcomes and records every request
pub struct ScriptedIndex {
    steps: Mutex<VecDeque<Step>>,
    pub requests: Mutex<Vec<(usize, usize, Vec<String>)>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub latency: Option<Duration>,
}

impl ScriptedIndex {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            latency: None,
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl VectorIndex for ScriptedIndex {
    async fn query(&self, query: KnnQuery<'_>) -> Result<Vec<CandidateHit>> {
        query.validate(DIM)?;
        self.requests.lock().push((
            query.k,
            query.num_candidates,
            query.fields.iter().map(|f| f.to_string()).collect(),
        ));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let step = self.steps.lock().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match step {
            Some(Step::Hits(hits)) => Ok(hits),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Hang) => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn ping(&self) -> Result<Duration> {
        Ok(Duration::from_millis(1))
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn backend_type(&self) -> IndexBackendType {
        IndexBackendType::Elasticsearch
    }
}

pub fn product(id: &str, name: &str, description: &str) -> CandidateHit {
    CandidateHit::new(
        id,
        1.0,
        ProductFields {
            name: Some(name.to_string()),
            description: Some(description.to_string()),
            ..Default::default()
        },
    )
}

/// `count` distinct products with descending scores
pub fn ranked_products(count: usize) -> Vec<CandidateHit> {
    (1..=count)
        .map(|i| {
            let mut hit = product(&format!("h{i}"), &format!("Product {i}"), "catalog item");
            hit.score = 1.0 - i as f32 * 0.01;
            hit
        })
        .collect()
}

pub fn searcher(
    provider: HashProvider,
    index: Arc<ScriptedIndex>,
    options: SearchOptions,
) -> ProductSearcher {
    ProductSearcher::new(Arc::new(provider), index, options).expect("valid options")
}
