//! End-to-end product search
//!
//! Each call to [`ProductSearcher::search`] walks
//! `Embedding -> Querying -> Deduplicating -> Done`, and can fail from any
//! phase. Component errors are translated into the four caller-facing
//! kinds before they leave this module.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::dedup::dedupe;
use crate::embeddings::{Embedder, EmbeddingProvider};
use crate::error::{Result, SearchError};
use crate::index::{KnnQuery, VectorIndex};
use crate::types::{CandidateHit, EmbeddingVector, SearchQuery, SearchResult, PRODUCT_FIELDS};

/// Lower bound on the candidates each shard examines
pub const MIN_NUM_CANDIDATES: usize = 500;

/// Candidates examined per requested hit
pub const CANDIDATE_MULTIPLIER: usize = 25;

/// Hard ceiling on `num_candidates` accepted by the index
pub const MAX_NUM_CANDIDATES: usize = 10_000;

/// Attempts per index query (one retry)
const MAX_QUERY_ATTEMPTS: u32 = 2;

/// Number of candidates the index examines for a pool of `k` hits.
///
/// `max(25k, 500)`, capped at the index limit but never below `k`.
pub fn num_candidates_for(k: usize) -> usize {
    k.saturating_mul(CANDIDATE_MULTIPLIER)
        .max(MIN_NUM_CANDIDATES)
        .min(MAX_NUM_CANDIDATES)
        .max(k)
}

/// Per-call progress, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Embedding,
    Querying,
    Deduplicating,
    Done,
}

/// Tuning for [`ProductSearcher`]
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Results returned when the caller gives no count (N)
    pub default_limit: usize,
    /// Candidate pool requested from the index (K), raised to N when smaller
    pub default_candidates: usize,
    /// Deadline for producing the query embedding
    pub embed_timeout: Duration,
    /// Deadline for each index query attempt
    pub query_timeout: Duration,
    /// Searches allowed in flight at once
    pub max_concurrent: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            default_limit: SearchQuery::DEFAULT_LIMIT,
            default_candidates: SearchQuery::DEFAULT_CANDIDATES,
            embed_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(10),
            max_concurrent: 8,
        }
    }
}

/// Semantic product search over a vector index.
///
/// Cheap to share behind an `Arc`; concurrent searches are independent
/// apart from the embedding model and a concurrency limit.
pub struct ProductSearcher {
    embedder: Embedder,
    index: Arc<dyn VectorIndex>,
    options: SearchOptions,
    permits: Semaphore,
}

impl ProductSearcher {
    /// Build a searcher whose embeddings must match the index dimensionality
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        options: SearchOptions,
    ) -> Result<Self> {
        if options.default_limit == 0 || options.default_candidates == 0 {
            return Err(SearchError::InvalidConfig(
                "default result and candidate counts must be at least 1".into(),
            ));
        }
        if options.max_concurrent == 0 {
            return Err(SearchError::InvalidConfig(
                "concurrency limit must be at least 1".into(),
            ));
        }

        let embedder = Embedder::new(provider, index.dimension());
        Ok(Self {
            embedder,
            index,
            permits: Semaphore::new(options.max_concurrent),
            options,
        })
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Search for `text`, returning up to `limit` products (default N).
    pub async fn search_text(&self, text: &str, limit: Option<usize>) -> Result<SearchResult> {
        let limit = limit.unwrap_or(self.options.default_limit);
        let query = SearchQuery::with_counts(
            text,
            limit,
            self.options.default_candidates.max(limit),
        )?;
        self.search(&query).await
    }

    /// Run one search.
    ///
    /// Errors are always one of `InvalidInput`, `ServiceUnavailable`,
    /// `BadQuery` or `ModelUnavailable`. A search with no matches returns an
    /// empty result.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResult> {
        let _permit = self.permits.acquire().await.map_err(|_| {
            SearchError::ServiceUnavailable("search service is shutting down".into())
        })?;

        let start = Instant::now();
        let mut phase = SearchPhase::Embedding;

        let outcome = self.run(query, &mut phase).await;
        match outcome {
            Ok(result) => {
                info!(
                    results = result.len(),
                    candidates = result.candidates_seen,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Search complete"
                );
                Ok(result)
            }
            Err(e) => {
                let e = translate(e);
                warn!(?phase, kind = ?e.kind(), error = %e, "Search failed");
                Err(e)
            }
        }
    }

    async fn run(&self, query: &SearchQuery, phase: &mut SearchPhase) -> Result<SearchResult> {
        debug!(phase = ?SearchPhase::Embedding, query = query.text(), "Embedding query");
        let vector = self.embed(query.text()).await?;

        *phase = SearchPhase::Querying;
        let hits = self.query_with_retry(&vector, query.candidates()).await?;
        drop(vector);

        *phase = SearchPhase::Deduplicating;
        let candidates_seen = hits.len();
        debug!(phase = ?SearchPhase::Deduplicating, candidates_seen, limit = query.limit());
        let hits = dedupe(hits, query.limit())?;

        *phase = SearchPhase::Done;
        Ok(SearchResult {
            hits,
            candidates_seen,
        })
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        match tokio::time::timeout(self.options.embed_timeout, self.embedder.embed(text)).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::ServiceUnavailable(format!(
                "embedding did not complete within {:?}",
                self.options.embed_timeout
            ))),
        }
    }

    async fn query_with_retry(
        &self,
        vector: &EmbeddingVector,
        k: usize,
    ) -> Result<Vec<CandidateHit>> {
        let request = KnnQuery {
            vector,
            k,
            num_candidates: num_candidates_for(k),
            fields: &PRODUCT_FIELDS,
        };
        debug!(
            phase = ?SearchPhase::Querying,
            k = request.k,
            num_candidates = request.num_candidates,
            backend = %self.index.backend_type(),
            "Querying index"
        );

        let mut attempt = 1;
        loop {
            let result =
                match tokio::time::timeout(self.options.query_timeout, self.index.query(request))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(SearchError::Timeout(format!(
                        "index query exceeded {:?}",
                        self.options.query_timeout
                    ))),
                };

            match result {
                Err(e) if e.is_retryable() && attempt < MAX_QUERY_ATTEMPTS => {
                    warn!(attempt, error = %e, "Index query failed, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Fold component errors into the caller-facing kinds
fn translate(err: SearchError) -> SearchError {
    match err {
        e @ (SearchError::InvalidInput(_)
        | SearchError::ServiceUnavailable(_)
        | SearchError::BadQuery(_)) => e,
        SearchError::ModelUnavailable(cause) => {
            SearchError::ServiceUnavailable(format!("embedding model unavailable: {}", cause))
        }
        SearchError::IndexUnreachable(cause) | SearchError::Timeout(cause) => {
            SearchError::ServiceUnavailable(format!("vector index unavailable: {}", cause))
        }
        SearchError::QueryRejected(cause) => SearchError::BadQuery(cause),
        e @ (SearchError::DimensionMismatch { .. }
        | SearchError::ModelMismatch { .. }
        | SearchError::MalformedResponse(_)
        | SearchError::InvalidConfig(_)) => {
            SearchError::BadQuery(e.to_string())
        }
        other => SearchError::ServiceUnavailable(other.to_string()),
    }
}

impl std::fmt::Debug for ProductSearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductSearcher")
            .field("embedder", &self.embedder)
            .field("backend", &self.index.backend_type())
            .field("options", &self.options)
            .finish()
    }
}
