//! Order-preserving deduplication of index hits

use std::collections::HashSet;

use crate::error::{Result, SearchError};
use crate::types::CandidateHit;

/// Identity of a logical product.
///
/// Hits with both a name and a description are keyed on the pair; any
/// other hit is keyed on its document id so it never collides with a
/// different document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Product { name: String, description: String },
    Document(String),
}

impl DedupKey {
    pub fn for_hit(hit: &CandidateHit) -> Self {
        match (&hit.fields.name, &hit.fields.description) {
            (Some(name), Some(description)) => DedupKey::Product {
                name: name.clone(),
                description: description.clone(),
            },
            _ => DedupKey::Document(hit.id.clone()),
        }
    }
}

/// Keep the first hit for each [`DedupKey`], up to `limit` hits.
///
/// Input order is preserved. Iteration stops as soon as `limit` hits are
/// kept, so later hits are never pulled from the iterator.
pub fn dedupe<I>(hits: I, limit: usize) -> Result<Vec<CandidateHit>>
where
    I: IntoIterator<Item = CandidateHit>,
{
    if limit == 0 {
        return Err(SearchError::InvalidInput(
            "result limit must be at least 1".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(limit);

    for hit in hits {
        if seen.insert(DedupKey::for_hit(&hit)) {
            kept.push(hit);
            if kept.len() == limit {
                break;
            }
        }
    }

    Ok(kept)
}
