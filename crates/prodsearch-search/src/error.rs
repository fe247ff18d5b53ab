//! Error types for prodsearch-search

use thiserror::Error;

/// Errors that can occur in prodsearch-search operations
///
/// The first four variants are the kinds a caller of
/// [`ProductSearcher::search`](crate::ProductSearcher::search) can observe.
/// The remaining variants are raised by individual components and are
/// translated by the searcher before they reach the caller.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Malformed caller-supplied input (empty text, non-positive counts)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Embedding backend or vector index unavailable after retry
    #[error("Search service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The index rejected the query shape
    #[error("Bad query: {0}")]
    BadQuery(String),

    /// Embedding model could not be loaded or invoked
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    // =========================================================================
    // Component errors
    // =========================================================================
    /// Connection or transport failure talking to the vector index
    #[error("Vector index unreachable: {0}")]
    IndexUnreachable(String),

    /// The vector index reported the query as malformed
    #[error("Query rejected by vector index: {0}")]
    QueryRejected(String),

    /// The vector index answered with a body that does not decode
    #[error("Malformed index response: {0}")]
    MalformedResponse(String),

    /// An external call did not complete before its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Embedding dimension mismatch
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Query embeddings would come from a different model than the index vectors
    #[error("Embedding model mismatch: index was built with '{expected}', queries use '{actual}'")]
    ModelMismatch { expected: String, actual: String },

    /// Embedding inference failure
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Embedding provider authentication failed
    #[error("Embedding provider authentication failed: {0}")]
    ProviderAuth(String),

    /// Embedding provider rate limited
    #[error("Embedding provider rate limited, retry after {retry_after:?} seconds")]
    ProviderRateLimit { retry_after: Option<u64> },

    /// Embedding model not known to the provider
    #[error("Embedding model not found: {0}")]
    InvalidModel(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Caller-facing error classification
///
/// Presentation layers render each kind with a distinct message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchErrorKind {
    /// User-correctable input problem; never retried
    InvalidInput,
    /// Transient failure; the caller may retry later
    ServiceUnavailable,
    /// Configuration or programming defect; never retried
    BadQuery,
    /// Embedding resource failed to initialize
    ModelUnavailable,
}

impl SearchErrorKind {
    /// Short user-facing message for this kind of failure
    pub fn user_message(&self) -> &'static str {
        match self {
            SearchErrorKind::InvalidInput => "Please enter a search query!",
            SearchErrorKind::ServiceUnavailable => {
                "The search service is temporarily unavailable. Please try again later."
            }
            SearchErrorKind::BadQuery => {
                "The search index rejected the query. This is a configuration problem."
            }
            SearchErrorKind::ModelUnavailable => {
                "The embedding model could not be loaded. Search is disabled until this is fixed."
            }
        }
    }
}

impl SearchError {
    /// Whether a single retry of the same request is worthwhile
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::IndexUnreachable(_) | SearchError::Timeout(_)
        )
    }

    /// Classify this error into a caller-facing kind
    pub fn kind(&self) -> SearchErrorKind {
        match self {
            SearchError::InvalidInput(_) => SearchErrorKind::InvalidInput,
            SearchError::ServiceUnavailable(_)
            | SearchError::IndexUnreachable(_)
            | SearchError::Timeout(_)
            | SearchError::ProviderRateLimit { .. }
            | SearchError::Serialization(_)
            | SearchError::Io(_) => SearchErrorKind::ServiceUnavailable,
            SearchError::BadQuery(_)
            | SearchError::QueryRejected(_)
            | SearchError::MalformedResponse(_)
            | SearchError::DimensionMismatch { .. }
            | SearchError::ModelMismatch { .. }
            | SearchError::InvalidConfig(_) => SearchErrorKind::BadQuery,
            SearchError::ModelUnavailable(_)
            | SearchError::Embedding(_)
            | SearchError::ProviderAuth(_)
            | SearchError::InvalidModel(_) => SearchErrorKind::ModelUnavailable,
        }
    }
}

impl From<candle_core::Error> for SearchError {
    fn from(err: candle_core::Error) -> Self {
        SearchError::Embedding(err.to_string())
    }
}

/// Result type for prodsearch-search operations
pub type Result<T> = std::result::Result<T, SearchError>;
