//! Core value types flowing through the search pipeline

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, SearchError};

/// Source fields requested from the index for every hit.
///
/// Names match the catalog documents exactly, including the
/// `"Price (INR)"` spelling.
pub const PRODUCT_FIELDS: [&str; 6] = [
    "ProductName",
    "Description",
    "ProductID",
    "ProductBrand",
    "Price (INR)",
    "PrimaryColor",
];

/// A validated search request.
///
/// Fields are private so a constructed query always satisfies
/// `limit >= 1`, `candidates >= limit` and non-blank text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    text: String,
    limit: usize,
    candidates: usize,
}

impl SearchQuery {
    /// Results returned when no count is requested (N)
    pub const DEFAULT_LIMIT: usize = 10;

    /// Candidate pool requested from the index (K)
    pub const DEFAULT_CANDIDATES: usize = 20;

    /// Query with default result count and candidate pool.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        Self::with_limit(text, Self::DEFAULT_LIMIT)
    }

    /// Query returning up to `limit` results.
    ///
    /// The candidate pool is the default, raised to `limit` when smaller.
    pub fn with_limit(text: impl Into<String>, limit: usize) -> Result<Self> {
        Self::with_counts(text, limit, Self::DEFAULT_CANDIDATES.max(limit))
    }

    /// Query with an explicit result count and candidate pool.
    pub fn with_counts(text: impl Into<String>, limit: usize, candidates: usize) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SearchError::InvalidInput(
                "query text must not be empty".to_string(),
            ));
        }
        if limit == 0 {
            return Err(SearchError::InvalidInput(
                "result count must be at least 1".to_string(),
            ));
        }
        if candidates < limit {
            return Err(SearchError::InvalidInput(format!(
                "candidate pool ({}) must be at least the result count ({})",
                candidates, limit
            )));
        }
        Ok(Self {
            text,
            limit,
            candidates,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Requested result count (N)
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Candidate pool size (K)
    pub fn candidates(&self) -> usize {
        self.candidates
    }
}

/// A query embedding.
///
/// Read-only once produced; the index client borrows it.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

/// Typed projection of a catalog document.
///
/// Every field is optional. Text fields accept strings or numbers, numeric
/// fields accept numbers or numeric strings, and anything else is dropped
/// without failing the rest of the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductFields {
    #[serde(
        rename = "ProductName",
        default,
        deserialize_with = "lenient_string"
    )]
    pub name: Option<String>,

    #[serde(
        rename = "Description",
        default,
        deserialize_with = "lenient_string"
    )]
    pub description: Option<String>,

    #[serde(
        rename = "ProductID",
        default,
        deserialize_with = "lenient_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub product_id: Option<String>,

    #[serde(
        rename = "ProductBrand",
        default,
        deserialize_with = "lenient_string"
    )]
    pub brand: Option<String>,

    #[serde(
        rename = "Price (INR)",
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub price_inr: Option<f64>,

    #[serde(
        rename = "PrimaryColor",
        default,
        deserialize_with = "lenient_string"
    )]
    pub primary_color: Option<String>,
}

/// A scored document returned by the vector index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateHit {
    /// Document identifier assigned by the index
    pub id: String,

    /// Relevance score, higher is more similar
    pub score: f32,

    #[serde(flatten)]
    pub fields: ProductFields,
}

impl CandidateHit {
    pub fn new(id: impl Into<String>, score: f32, fields: ProductFields) -> Self {
        Self {
            id: id.into(),
            score,
            fields,
        }
    }
}

/// Ranked, deduplicated hits for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResult {
    pub hits: Vec<CandidateHit>,

    /// Raw hits returned by the index before deduplication
    #[serde(skip)]
    pub candidates_seen: usize,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CandidateHit> {
        self.hits.iter()
    }
}

impl IntoIterator for SearchResult {
    type Item = CandidateHit;
    type IntoIter = std::vec::IntoIter<CandidateHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite()))
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::String(s)) if s.trim().parse::<f64>().is_ok() => {
            Some(s.trim().to_string())
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_defaults() {
        let query = SearchQuery::new("red dress").unwrap();
        assert_eq!(query.text(), "red dress");
        assert_eq!(query.limit(), 10);
        assert_eq!(query.candidates(), 20);
    }

    #[test]
    fn test_query_limit_raises_candidates() {
        let query = SearchQuery::with_limit("watch", 50).unwrap();
        assert_eq!(query.limit(), 50);
        assert_eq!(query.candidates(), 50);
    }

    #[test]
    fn test_query_rejects_blank_text() {
        assert!(matches!(
            SearchQuery::new("   \t"),
            Err(SearchError::InvalidInput(_))
        ));
        assert!(matches!(
            SearchQuery::new(""),
            Err(SearchError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_query_rejects_bad_counts() {
        assert!(SearchQuery::with_limit("shoes", 0).is_err());
        assert!(SearchQuery::with_counts("shoes", 10, 5).is_err());
        assert!(SearchQuery::with_counts("shoes", 10, 10).is_ok());
    }

    #[test]
    fn test_fields_deserialize_full_document() {
        let fields: ProductFields = serde_json::from_value(json!({
            "ProductName": "Nike Air Zoom",
            "Description": "Blue running shoes",
            "ProductID": 10017413,
            "ProductBrand": "Nike",
            "Price (INR)": 4999,
            "PrimaryColor": "Blue"
        }))
        .unwrap();

        assert_eq!(fields.name.as_deref(), Some("Nike Air Zoom"));
        assert_eq!(fields.product_id.as_deref(), Some("10017413"));
        assert_eq!(fields.price_inr, Some(4999.0));
        assert_eq!(fields.primary_color.as_deref(), Some("Blue"));
    }

    #[test]
    fn test_fields_lenient_numbers() {
        let fields: ProductFields = serde_json::from_value(json!({
            "ProductID": "10017413",
            "Price (INR)": "1,299"
        }))
        .unwrap();
        assert_eq!(fields.product_id.as_deref(), Some("10017413"));
        assert_eq!(fields.price_inr, Some(1299.0));

        let fields: ProductFields = serde_json::from_value(json!({
            "ProductID": "n/a",
            "Price (INR)": "call for price"
        }))
        .unwrap();
        assert_eq!(fields.product_id, None);
        assert_eq!(fields.price_inr, None);
    }

    #[test]
    fn test_fields_odd_text_values_dropped_per_field() {
        let fields: ProductFields = serde_json::from_value(json!({
            "ProductName": 12345,
            "Description": "Red",
            "ProductBrand": ["Nike"],
            "PrimaryColor": { "name": "Red" }
        }))
        .unwrap();

        assert_eq!(fields.name.as_deref(), Some("12345"));
        assert_eq!(fields.description.as_deref(), Some("Red"));
        assert_eq!(fields.brand, None);
        assert_eq!(fields.primary_color, None);
    }

    #[test]
    fn test_fields_missing_everything() {
        let fields: ProductFields = serde_json::from_value(json!({})).unwrap();
        assert_eq!(fields, ProductFields::default());

        let fields: ProductFields =
            serde_json::from_value(json!({ "Price (INR)": null, "ProductName": null })).unwrap();
        assert_eq!(fields, ProductFields::default());
    }

    #[test]
    fn test_hit_serializes_flat() {
        let hit = CandidateHit::new(
            "doc-1",
            0.92,
            ProductFields {
                name: Some("Kurta".into()),
                ..Default::default()
            },
        );
        let value = serde_json::to_value(&hit).unwrap();
        assert_eq!(value["id"], "doc-1");
        assert_eq!(value["ProductName"], "Kurta");
    }
}
