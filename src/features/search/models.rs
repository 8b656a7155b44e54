use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

use crate::features::documents::models::DocumentResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Simple,
    Phrase,
    Fuzzy,
    Boolean,
}

impl Default for SearchMode {
    fn default() -> Self {
        Self::Simple
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
    pub owner_id: Option<Uuid>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    /// Subset containment over the document's JSON meta.
    pub meta_filters: Option<JsonValue>,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    #[validate(length(min = 1, max = 500, message = "Query must be 1-500 characters"))]
    pub query: String,

    #[serde(default)]
    pub mode: SearchMode,

    pub filters: Option<SearchFilters>,

    #[serde(default = "default_page")]
    pub page: i64,

    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

#[derive(Debug, Serialize)]
pub struct SearchHighlight {
    pub field: String,
    pub fragment: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResultItem {
    pub document: DocumentResponse,
    pub rank: f32,
    pub highlights: Vec<SearchHighlight>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub items: Vec<SearchResultItem>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub pages: i64,
    pub query: String,
    pub mode: SearchMode,
}

#[derive(Debug, Serialize)]
pub struct SearchSuggestion {
    pub text: String,
    pub document_id: Uuid,
    pub field: String,
}

#[derive(Debug, Serialize)]
pub struct SearchSuggestionsResponse {
    pub suggestions: Vec<SearchSuggestion>,
    pub query: String,
}

fn default_suggestion_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct SuggestionsQuery {
    pub q: String,

    #[serde(default = "default_suggestion_limit")]
    pub limit: i64,
}
